//! Process-wide stock change broadcast.
//!
//! [`StockChannel`] records the last-known stock of every record and pushes
//! each change to all subscribers synchronously, in subscription order. There
//! is no replay: a subscriber only sees changes published after it joined.
//!
//! Handlers run without the channel lock held, so a handler may publish,
//! subscribe or dispose. A handler that panics is logged and skipped; the
//! remaining handlers still receive the event.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use record_store_core::{RecordId, StockEvent};
use tracing::{error, trace};

type Handler = Arc<dyn Fn(&StockEvent) + Send + Sync>;

/// Broadcast channel for per-record stock levels.
///
/// Cheaply cloneable; clones share subscribers and stock levels.
#[derive(Clone, Default)]
pub struct StockChannel {
    inner: Arc<ChannelInner>,
}

#[derive(Default)]
struct ChannelInner {
    state: Mutex<ChannelState>,
}

#[derive(Default)]
struct ChannelState {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
    levels: HashMap<RecordId, u32>,
}

impl ChannelInner {
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StockChannel {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `new_stock` for `record_id` and notify every current subscriber.
    pub fn update_stock(&self, record_id: RecordId, new_stock: u32) {
        let handlers: Vec<Handler> = {
            let mut state = self.inner.lock();
            state.levels.insert(record_id, new_stock);
            state
                .handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        let event = StockEvent::new(record_id, new_stock);
        trace!(%record_id, new_stock, subscribers = handlers.len(), "Publishing stock update");

        for (position, handler) in handlers.iter().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(
                    %record_id,
                    new_stock,
                    position,
                    "Stock handler panicked, continuing delivery"
                );
            }
        }
    }

    /// Register a handler for future stock changes.
    ///
    /// The handler stays registered until the returned subscription is
    /// disposed or dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, handler: F) -> StockSubscription
    where
        F: Fn(&StockEvent) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.handlers.push((id, Arc::new(handler)));
        StockSubscription {
            id,
            channel: Some(Arc::downgrade(&self.inner)),
        }
    }

    /// Last stock recorded for a record.
    #[must_use]
    pub fn stock_of(&self, record_id: RecordId) -> Option<u32> {
        self.inner.lock().levels.get(&record_id).copied()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }
}

/// Disposer returned by [`StockChannel::subscribe`].
#[derive(Debug)]
pub struct StockSubscription {
    id: u64,
    channel: Option<Weak<ChannelInner>>,
}

impl StockSubscription {
    /// Unregister the handler. Calling this more than once is a no-op.
    ///
    /// An update already being delivered when this runs may still reach the
    /// handler once.
    pub fn dispose(&mut self) {
        if let Some(inner) = self.channel.take().and_then(|weak| weak.upgrade()) {
            inner.lock().handlers.retain(|(id, _)| *id != self.id);
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.channel.is_some()
    }
}

impl Drop for StockSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for StockChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("StockChannel")
            .field("subscribers", &state.handlers.len())
            .field("levels", &state.levels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn recorder(channel: &StockChannel) -> (StockSubscription, Arc<Mutex<Vec<StockEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = channel.subscribe(move |event| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(*event);
        });
        (sub, seen)
    }

    fn events(seen: &Arc<Mutex<Vec<StockEvent>>>) -> Vec<StockEvent> {
        seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[test]
    fn test_delivers_in_subscription_order() {
        let channel = StockChannel::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = (0..3)
            .map(|n| {
                let order = Arc::clone(&order);
                channel.subscribe(move |_| order.lock().unwrap_or_else(PoisonError::into_inner).push(n))
            })
            .collect();

        channel.update_stock(RecordId::new(1), 4);

        assert_eq!(*order.lock().unwrap_or_else(PoisonError::into_inner), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_late_subscriber_sees_only_future_events() {
        let channel = StockChannel::new();
        channel.update_stock(RecordId::new(1), 5);

        let (_sub, seen) = recorder(&channel);
        assert!(events(&seen).is_empty());

        channel.update_stock(RecordId::new(1), 4);
        assert_eq!(events(&seen), vec![StockEvent::new(RecordId::new(1), 4)]);
        assert_eq!(channel.stock_of(RecordId::new(1)), Some(4));
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let channel = StockChannel::new();
        let _bad = channel.subscribe(|_| panic!("handler failure"));
        let (_good, seen) = recorder(&channel);

        channel.update_stock(RecordId::new(2), 1);
        channel.update_stock(RecordId::new(2), 0);

        assert_eq!(events(&seen).len(), 2);
    }

    #[test]
    fn test_dispose_is_idempotent_and_stops_delivery() {
        let channel = StockChannel::new();
        let (mut sub, seen) = recorder(&channel);
        assert_eq!(channel.subscriber_count(), 1);

        sub.dispose();
        sub.dispose();
        assert!(!sub.is_active());
        assert_eq!(channel.subscriber_count(), 0);

        channel.update_stock(RecordId::new(1), 9);
        assert!(events(&seen).is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let channel = StockChannel::new();
        let (sub, _seen) = recorder(&channel);
        drop(sub);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_may_publish_reentrantly() {
        let channel = StockChannel::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = channel.clone();
        let counter = Arc::clone(&calls);
        let _sub = channel.subscribe(move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            if event.new_stock > 0 {
                inner.update_stock(event.record_id, event.new_stock - 1);
            }
        });

        channel.update_stock(RecordId::new(7), 2);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(channel.stock_of(RecordId::new(7)), Some(0));
    }
}
