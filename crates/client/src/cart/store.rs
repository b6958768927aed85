//! The session cart store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use record_store_core::{CartState, Email, Price, Record, RecordId};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::in_flight::InFlight;
use crate::error::{CartError, TransportError, ValidationError};
use crate::remote::{CartService, within_deadline};
use crate::stock::StockChannel;

/// Result of a confirmed add or remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartOutcome {
    pub record_id: RecordId,
    /// Quantity of the record in the cart after reconciliation.
    pub quantity: u32,
    /// Stock of the record after reconciliation.
    pub stock: u32,
}

/// Owner of the active session's cart.
///
/// All mutations go through this type. Add and remove apply optimistically,
/// call the remote service within the configured deadline, then reconcile
/// with the server's answer or roll back. Mutations for one record are
/// serialized; different records proceed concurrently.
///
/// A change awaiting the server stays pending: a sync or a stock seed that
/// lands meanwhile is applied underneath it, and a rollback removes exactly
/// that change from whatever the current state is.
pub struct CartStore<S> {
    service: S,
    stock: StockChannel,
    deadline: Duration,
    state: Mutex<StoreState>,
    /// Serializes every stock value this store publishes.
    stock_writes: Mutex<()>,
    in_flight: InFlight,
    cart_tx: watch::Sender<Arc<CartState>>,
    count_tx: watch::Sender<u32>,
    total_tx: watch::Sender<Price>,
}

struct StoreState {
    cart: Arc<CartState>,
    session: Option<Email>,
    pending: HashMap<RecordId, Pending>,
}

impl StoreState {
    /// Stop counting pending changes as part of the cart. Their stock is
    /// still restored if they fail.
    fn detach_pending(&mut self) {
        for pending in self.pending.values_mut() {
            pending.in_cart = false;
        }
    }
}

/// An add or remove applied locally whose remote call has not answered.
#[derive(Debug, Clone, Copy)]
struct Pending {
    change: Change,
    /// Last known server stock, without this change.
    stock_before: u32,
    /// Cleared when the cart is reset while the call is outstanding.
    in_cart: bool,
    /// Set when server values replaced the local ones while the call was
    /// outstanding; the server may already include the change.
    overlaid: bool,
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Add(Price),
    /// Carries the line's unit price to restore it on rollback.
    Remove(Price),
}

impl Change {
    fn apply(self, cart: &CartState, record_id: RecordId) -> CartState {
        match self {
            Self::Add(price) => cart.with_added(record_id, price),
            Self::Remove(_) => cart.with_removed(record_id),
        }
    }

    fn revert(self, cart: &CartState, record_id: RecordId) -> CartState {
        match self {
            Self::Add(_) => cart.with_removed(record_id),
            Self::Remove(price) => cart.with_added(record_id, price),
        }
    }

    /// Stock once this change is applied.
    const fn shift(self, stock: u32) -> u32 {
        match self {
            Self::Add(_) => stock.saturating_sub(1),
            Self::Remove(_) => stock.saturating_add(1),
        }
    }
}

/// Forgets a pending change when its call is abandoned, so it is never
/// applied to later syncs.
struct PendingGuard<'a> {
    state: &'a Mutex<StoreState>,
    record_id: RecordId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .remove(&self.record_id);
    }
}

/// A change that passed its preconditions and was applied optimistically.
struct Begun<'a> {
    email: Email,
    optimistic: u32,
    _pending: PendingGuard<'a>,
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl<S> CartStore<S> {
    /// Create a store with an empty, disabled cart and no session.
    pub fn new(service: S, stock: StockChannel, deadline: Duration) -> Self {
        let cart = Arc::new(CartState::disabled());
        let (cart_tx, _) = watch::channel(Arc::clone(&cart));
        let (count_tx, _) = watch::channel(0);
        let (total_tx, _) = watch::channel(Price::ZERO);

        Self {
            service,
            stock,
            deadline,
            state: Mutex::new(StoreState {
                cart,
                session: None,
                pending: HashMap::new(),
            }),
            stock_writes: Mutex::new(()),
            in_flight: InFlight::default(),
            cart_tx,
            count_tx,
            total_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stock_writes(&self) -> MutexGuard<'_, ()> {
        self.stock_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in the next cart state and publish it, all under the state lock
    /// so subscribers observe swaps in order.
    fn apply(&self, next: impl FnOnce(&mut StoreState) -> CartState) -> Arc<CartState> {
        let mut state = self.lock();
        let cart = next(&mut state);
        self.swap(&mut state, cart)
    }

    fn swap(&self, state: &mut StoreState, cart: CartState) -> Arc<CartState> {
        let cart = Arc::new(cart);
        state.cart = Arc::clone(&cart);
        self.publish(&cart);
        cart
    }

    fn publish(&self, cart: &Arc<CartState>) {
        self.cart_tx.send_replace(Arc::clone(cart));
        let count = cart.item_count();
        self.count_tx
            .send_if_modified(|current| replace_if_changed(current, count));
        let total = cart.total();
        self.total_tx
            .send_if_modified(|current| replace_if_changed(current, total));
    }

    /// The current cart.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CartState> {
        Arc::clone(&self.lock().cart)
    }

    #[must_use]
    pub fn quantity_of(&self, record_id: RecordId) -> u32 {
        self.lock().cart.quantity_of(record_id)
    }

    /// Email of the active session.
    #[must_use]
    pub fn session(&self) -> Option<Email> {
        self.lock().session.clone()
    }

    /// Whether an add or remove for the record is awaiting the server.
    #[must_use]
    pub fn is_in_flight(&self, record_id: RecordId) -> bool {
        self.in_flight.contains(record_id)
    }

    /// Stream of cart snapshots, one per mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CartState>> {
        self.cart_tx.subscribe()
    }

    /// Stream of the total item count. Notifies only when the count changes.
    #[must_use]
    pub fn item_count(&self) -> watch::Receiver<u32> {
        self.count_tx.subscribe()
    }

    /// Stream of the monetary total. Notifies only when the total changes.
    #[must_use]
    pub fn total(&self) -> watch::Receiver<Price> {
        self.total_tx.subscribe()
    }

    /// Channel on which this store publishes stock changes.
    #[must_use]
    pub const fn stock_channel(&self) -> &StockChannel {
        &self.stock
    }

    /// Deadline applied to every remote call.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        self.deadline
    }

    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Clear the cart and switch cart functionality off.
    ///
    /// The session identity is kept.
    pub fn reset_cart(&self) -> Arc<CartState> {
        debug!("Resetting cart");
        self.apply(|state| {
            state.detach_pending();
            CartState::disabled()
        })
    }

    /// Forget the session and clear the cart.
    pub fn end_session(&self) {
        info!("Ending cart session");
        self.apply(|state| {
            state.session = None;
            state.detach_pending();
            CartState::disabled()
        });
    }

    /// Publish stock fetched from the server.
    ///
    /// While an add or remove of the record awaits the server, the published
    /// value keeps that change applied and a rollback returns to `stock`.
    /// Returns the published value. Must not be called from a stock handler.
    pub fn seed_stock(&self, record_id: RecordId, stock: u32) -> u32 {
        let _writes = self.stock_writes();
        let published = {
            let mut state = self.lock();
            match state.pending.get_mut(&record_id) {
                Some(pending) => {
                    pending.stock_before = stock;
                    pending.overlaid = true;
                    pending.change.shift(stock)
                }
                None => stock,
            }
        };
        self.stock.update_stock(record_id, published);
        published
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        within_deadline(operation, self.deadline, call).await
    }

    /// Check preconditions, then apply `change` to the cart and the stock as
    /// one step with respect to syncs and stock seeds.
    fn begin(
        &self,
        record: &Record,
        change: impl FnOnce(&StoreState, u32) -> Result<Change, ValidationError>,
    ) -> Result<Begun<'_>, ValidationError> {
        let record_id = record.id;
        let _writes = self.stock_writes();
        let (email, optimistic) = {
            let mut state = self.lock();
            let email = state.session.clone().ok_or(ValidationError::NoSession)?;
            let stock = self.stock.stock_of(record_id).unwrap_or(record.stock);
            let change = change(&state, stock)?;

            let cart = change.apply(&state.cart, record_id);
            self.swap(&mut state, cart);
            state.pending.insert(
                record_id,
                Pending {
                    change,
                    stock_before: stock,
                    in_cart: true,
                    overlaid: false,
                },
            );
            (email, change.shift(stock))
        };
        self.stock.update_stock(record_id, optimistic);

        Ok(Begun {
            email,
            optimistic,
            _pending: PendingGuard {
                state: &self.state,
                record_id,
            },
        })
    }

    /// Forget the pending change of a confirmed call.
    fn settle(&self, record_id: RecordId) -> Option<Pending> {
        self.lock().pending.remove(&record_id)
    }

    /// Undo the pending change of a failed call and restore the stock last
    /// known without it.
    fn roll_back(&self, record_id: RecordId) {
        let _writes = self.stock_writes();
        let restored = {
            let mut state = self.lock();
            let Some(pending) = state.pending.remove(&record_id) else {
                return;
            };
            if pending.in_cart {
                let cart = pending.change.revert(&state.cart, record_id);
                self.swap(&mut state, cart);
            }
            pending.stock_before
        };
        self.stock.update_stock(record_id, restored);
    }

    /// Trust the server's stock over the local value when it sent one.
    fn reconcile_stock(&self, record_id: RecordId, optimistic: u32, reported: Option<u32>) -> u32 {
        let _writes = self.stock_writes();
        let current = self.stock.stock_of(record_id).unwrap_or(optimistic);
        match reported {
            Some(server) if server != current => {
                debug!(
                    %record_id,
                    current,
                    server,
                    "Server stock differs from local value, using server value"
                );
                self.stock.update_stock(record_id, server);
                server
            }
            Some(server) => server,
            None => current,
        }
    }
}

impl<S: CartService> CartStore<S> {
    /// Add one unit of `record` to the cart.
    ///
    /// Rejected without a remote call when the record is out of stock, the
    /// cart is disabled, there is no session, or a mutation for the record is
    /// already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Validation`] for a failed precondition and
    /// [`CartError::Transport`] when the remote call fails or times out; the
    /// optimistic update has been rolled back in that case.
    #[instrument(skip(self, record), fields(record_id = %record.id, operation_id = %Uuid::new_v4()))]
    pub async fn add_to_cart(&self, record: &Record) -> Result<CartOutcome, CartError> {
        let record_id = record.id;
        let _claim = self
            .in_flight
            .claim(record_id)
            .ok_or(ValidationError::InFlight(record_id))?;

        let begun = self.begin(record, |state, stock| {
            if !state.cart.is_enabled() {
                return Err(ValidationError::CartDisabled);
            }
            if stock == 0 {
                return Err(ValidationError::OutOfStock(record_id));
            }
            Ok(Change::Add(record.price))
        })?;
        debug!(optimistic = begun.optimistic, "Applied optimistic add");

        match self
            .within("add_to_cart", self.service.add_to_cart(&begun.email, record))
            .await
        {
            Ok(mutation) => {
                let settled = self.settle(record_id);
                let stock = self.reconcile_stock(record_id, begun.optimistic, mutation.stock);
                if settled.is_some_and(|pending| pending.in_cart && pending.overlaid) {
                    debug!("Cart was replaced while the add was in flight");
                    self.resync(&begun.email).await;
                }
                Ok(CartOutcome {
                    record_id,
                    quantity: self.quantity_of(record_id),
                    stock,
                })
            }
            Err(err) => {
                warn!(error = %err, "Add to cart failed, rolling back");
                self.roll_back(record_id);
                Err(err.into())
            }
        }
    }

    /// Remove one unit of `record` from the cart.
    ///
    /// A confirmed remove is followed by a full resynchronization with the
    /// remote cart. A failed resync is logged and the confirmed state kept.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Validation`] when the record is not in the cart,
    /// there is no session or a mutation is in flight, and
    /// [`CartError::Transport`] when the remote call fails (rolled back).
    #[instrument(skip(self, record), fields(record_id = %record.id, operation_id = %Uuid::new_v4()))]
    pub async fn remove_from_cart(&self, record: &Record) -> Result<CartOutcome, CartError> {
        let record_id = record.id;
        let _claim = self
            .in_flight
            .claim(record_id)
            .ok_or(ValidationError::InFlight(record_id))?;

        let begun = self.begin(record, |state, _| {
            let line = state
                .cart
                .line(record_id)
                .ok_or(ValidationError::NotInCart(record_id))?;
            Ok(Change::Remove(line.unit_price))
        })?;
        debug!(optimistic = begun.optimistic, "Applied optimistic remove");

        match self
            .within("remove_from_cart", self.service.remove_from_cart(&begun.email, record))
            .await
        {
            Ok(mutation) => {
                let settled = self.settle(record_id);
                let stock = self.reconcile_stock(record_id, begun.optimistic, mutation.stock);
                if settled.is_some_and(|pending| pending.in_cart) {
                    self.resync(&begun.email).await;
                }
                Ok(CartOutcome {
                    record_id,
                    quantity: self.quantity_of(record_id),
                    stock,
                })
            }
            Err(err) => {
                warn!(error = %err, "Remove from cart failed, rolling back");
                self.roll_back(record_id);
                Err(err.into())
            }
        }
    }

    async fn resync(&self, email: &Email) {
        if let Err(err) = self.sync_cart_with_backend(email).await {
            warn!(error = %err, "Cart resync after confirmed change failed, keeping local state");
        }
    }

    /// Whether the cart is enabled for `email`.
    ///
    /// Falls back to `true` when the status cannot be fetched, so a status
    /// outage never locks shoppers out of their cart.
    #[instrument(skip(self, email))]
    pub async fn get_cart_status(&self, email: &Email) -> bool {
        match self
            .within("get_cart_status", self.service.get_cart_status(email))
            .await
        {
            Ok(status) => status.enabled,
            Err(err) => {
                warn!(error = %err, "Cart status unavailable, treating cart as enabled");
                true
            }
        }
    }

    /// Replace the local cart with the remote cart of `email`.
    ///
    /// The swap is atomic: readers see either the old or the new cart. The
    /// enabled flag is kept. Changes still awaiting the server are applied on
    /// top of the remote lines.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Transport`] if the remote cart cannot be fetched;
    /// the local cart is left untouched.
    #[instrument(skip(self, email))]
    pub async fn sync_cart_with_backend(&self, email: &Email) -> Result<Arc<CartState>, CartError> {
        let lines = self
            .within("get_cart_items", self.service.get_cart_items(email))
            .await?;
        let synced_at = Utc::now();

        let cart = self.apply(|state| {
            state.session = Some(email.clone());
            let mut cart = CartState::from_lines(lines, state.cart.is_enabled()).synced(synced_at);
            for (record_id, pending) in &mut state.pending {
                if pending.in_cart {
                    cart = pending.change.apply(&cart, *record_id);
                    pending.overlaid = true;
                }
            }
            cart
        });
        debug!(
            lines = cart.lines().count(),
            item_count = cart.item_count(),
            "Cart synchronized"
        );
        Ok(cart)
    }

    /// Open the cart session for `email`.
    ///
    /// A different user's cart is cleared first. The cart is then synchronized
    /// when enabled for the session, or reset when disabled.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Transport`] if the synchronization fails.
    #[instrument(skip(self, email))]
    pub async fn establish_session(&self, email: &Email) -> Result<Arc<CartState>, CartError> {
        let switched = self.lock().session.as_ref() != Some(email);
        if switched {
            self.apply(|state| {
                state.session = Some(email.clone());
                state.detach_pending();
                CartState::disabled()
            });
        }

        if self.get_cart_status(email).await {
            self.apply(|state| state.cart.with_enabled(true));
            self.sync_cart_with_backend(email).await
        } else {
            info!("Cart disabled for session");
            Ok(self.reset_cart())
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use record_store_core::CartLine;

    use super::*;
    use crate::testing::{InMemoryCartService, email, record};

    const DEADLINE: Duration = Duration::from_secs(5);

    fn store(service: InMemoryCartService) -> CartStore<InMemoryCartService> {
        CartStore::new(service, StockChannel::new(), DEADLINE)
    }

    async fn open_store(service: InMemoryCartService) -> CartStore<InMemoryCartService> {
        let store = store(service);
        store.establish_session(&email()).await.unwrap();
        store
    }

    fn assert_totals_consistent(cart: &CartState) {
        let count: u32 = cart.lines().map(|l| l.quantity).sum();
        let total: Price = cart.lines().map(CartLine::subtotal).sum();
        assert_eq!(cart.item_count(), count);
        assert_eq!(cart.total(), total);
    }

    #[tokio::test]
    async fn test_add_success_reconciles_with_server_stock() {
        let store = open_store(InMemoryCartService::new()).await;
        let abbey = record(1, "Abbey Road", 3, 2500);

        let outcome = store.add_to_cart(&abbey).await.unwrap();

        assert_eq!(outcome, CartOutcome { record_id: abbey.id, quantity: 1, stock: 2 });
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(2));
        assert_eq!(store.snapshot().item_count(), 1);
        assert_eq!(store.snapshot().total(), Price::from_cents(2500));
        assert_eq!(store.service().add_calls(), 1);
    }

    #[tokio::test]
    async fn test_add_failure_rolls_back_quantity_and_stock() {
        let service = InMemoryCartService::new();
        service.fail_mutations(true);
        let store = open_store(service).await;
        let abbey = record(1, "Abbey Road", 3, 2500);

        let err = store.add_to_cart(&abbey).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(store.quantity_of(abbey.id), 0);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(3));
        assert_eq!(store.snapshot().item_count(), 0);
        assert_eq!(store.snapshot().total(), Price::ZERO);
        assert!(!store.is_in_flight(abbey.id));
    }

    #[tokio::test]
    async fn test_add_out_of_stock_never_reaches_server() {
        let store = open_store(InMemoryCartService::new()).await;
        let before = store.snapshot();

        let err = store.add_to_cart(&record(1, "Abbey Road", 0, 2500)).await.unwrap_err();

        assert!(matches!(err, CartError::Validation(ValidationError::OutOfStock(_))));
        assert_eq!(store.service().add_calls(), 0);
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_add_uses_last_known_stock_over_record_field() {
        let store = open_store(InMemoryCartService::new()).await;
        let abbey = record(1, "Abbey Road", 3, 2500);
        store.stock_channel().update_stock(abbey.id, 0);

        let err = store.add_to_cart(&abbey).await.unwrap_err();

        assert!(matches!(err, CartError::Validation(ValidationError::OutOfStock(_))));
        assert_eq!(store.service().add_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_requires_session_and_enabled_cart() {
        let store = store(InMemoryCartService::new());
        let abbey = record(1, "Abbey Road", 3, 2500);
        let err = store.add_to_cart(&abbey).await.unwrap_err();
        assert!(matches!(err, CartError::Validation(ValidationError::NoSession)));

        store.service().set_enabled(false);
        store.establish_session(&email()).await.unwrap();
        let err = store.add_to_cart(&abbey).await.unwrap_err();
        assert!(matches!(err, CartError::Validation(ValidationError::CartDisabled)));
        assert_eq!(store.service().add_calls(), 0);
    }

    #[tokio::test]
    async fn test_server_stock_wins_over_optimistic_value() {
        let service = InMemoryCartService::new();
        service.report_stock(record(1, "", 0, 0).id, 7);
        let store = open_store(service).await;

        let outcome = store.add_to_cart(&record(1, "Abbey Road", 3, 2500)).await.unwrap();

        assert_eq!(outcome.stock, 7);
        assert_eq!(store.stock_channel().stock_of(outcome.record_id), Some(7));
    }

    #[tokio::test]
    async fn test_missing_server_stock_keeps_optimistic_value() {
        let service = InMemoryCartService::new();
        service.omit_stock(true);
        let store = open_store(service).await;

        let outcome = store.add_to_cart(&record(1, "Abbey Road", 3, 2500)).await.unwrap();

        assert_eq!(outcome.stock, 2);
    }

    #[tokio::test]
    async fn test_second_add_for_same_record_is_rejected_while_in_flight() {
        let service = InMemoryCartService::new();
        let gate = service.hold_mutations();
        let store = open_store(service).await;
        let abbey = record(1, "Abbey Road", 3, 2500);

        let second = async {
            let result = store.add_to_cart(&abbey).await;
            gate.add_permits(1);
            result
        };
        let (first, second) = tokio::join!(store.add_to_cart(&abbey), second);

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(CartError::Validation(ValidationError::InFlight(_)))
        ));
        assert_eq!(store.service().add_calls(), 1);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(2));
        assert_eq!(store.quantity_of(abbey.id), 1);
    }

    #[tokio::test]
    async fn test_different_records_are_not_serialized() {
        let service = InMemoryCartService::new();
        let gate = service.hold_mutations();
        let store = open_store(service).await;
        let abbey = record(1, "Abbey Road", 3, 2500);
        let let_it_be = record(2, "Let It Be", 2, 2000);

        let release = async {
            let both_waiting =
                crate::testing::eventually(|| store.service().active_calls() == 2).await;
            gate.add_permits(2);
            both_waiting
        };
        let (a, b, both_waiting) = tokio::join!(
            store.add_to_cart(&abbey),
            store.add_to_cart(&let_it_be),
            release
        );

        assert!(both_waiting);
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(store.service().peak_concurrency(), 2);
        assert_eq!(store.snapshot().item_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_success_resyncs_with_backend() {
        let store = open_store(InMemoryCartService::new()).await;
        let abbey = record(1, "Abbey Road", 3, 2500);
        store.add_to_cart(&abbey).await.unwrap();
        store.add_to_cart(&abbey).await.unwrap();
        let reads_before = store.service().read_calls();

        let outcome = store.remove_from_cart(&abbey).await.unwrap();

        assert_eq!(outcome.quantity, 1);
        assert_eq!(outcome.stock, 2);
        assert_eq!(store.service().read_calls(), reads_before + 1);
        assert!(store.snapshot().synced_at().is_some());
        assert_eq!(store.snapshot().item_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_failure_restores_line_and_stock() {
        let store = open_store(InMemoryCartService::new()).await;
        let abbey = record(1, "Abbey Road", 3, 2500);
        store.add_to_cart(&abbey).await.unwrap();
        store.service().fail_mutations(true);

        let err = store.remove_from_cart(&abbey).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(store.quantity_of(abbey.id), 1);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(2));
        assert_eq!(
            store.snapshot().line(abbey.id).map(|l| l.unit_price),
            Some(Price::from_cents(2500))
        );
    }

    #[tokio::test]
    async fn test_remove_not_in_cart_is_rejected() {
        let store = open_store(InMemoryCartService::new()).await;

        let err = store
            .remove_from_cart(&record(1, "Abbey Road", 3, 2500))
            .await
            .unwrap_err();

        assert!(matches!(err, CartError::Validation(ValidationError::NotInCart(_))));
        assert_eq!(store.service().remove_calls(), 0);
    }

    #[tokio::test]
    async fn test_resync_failure_after_remove_keeps_confirmed_state() {
        let store = open_store(InMemoryCartService::new()).await;
        let abbey = record(1, "Abbey Road", 3, 2500);
        store.add_to_cart(&abbey).await.unwrap();
        store.service().fail_reads(true);

        let outcome = store.remove_from_cart(&abbey).await.unwrap();

        assert_eq!(outcome.quantity, 0);
        assert_eq!(store.snapshot().item_count(), 0);
    }

    #[tokio::test]
    async fn test_totals_hold_after_every_step_with_failures() {
        let store = open_store(InMemoryCartService::new()).await;
        let abbey = record(1, "Abbey Road", 10, 1999);

        let steps = [
            (true, false),
            (true, false),
            (true, true),
            (false, false),
            (true, false),
            (false, true),
            (false, false),
            (false, false),
            (false, false),
        ];
        for (add, fail) in steps {
            store.service().fail_mutations(fail);
            let _ = if add {
                store.add_to_cart(&abbey).await
            } else {
                store.remove_from_cart(&abbey).await
            };
            assert_totals_consistent(&store.snapshot());
        }
        assert_eq!(store.quantity_of(abbey.id), 0);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(10));
    }

    #[tokio::test]
    async fn test_sync_replaces_with_remote_cart() {
        let service = InMemoryCartService::new()
            .with_line(CartLine::new(record(1, "", 0, 0).id, 2, Price::from_cents(1000)))
            .with_line(CartLine::new(record(2, "", 0, 0).id, 1, Price::from_cents(1500)));
        let store = open_store(service).await;

        let cart = store.sync_cart_with_backend(&email()).await.unwrap();

        let expected = CartState::from_lines(store.service().server_lines(), true);
        assert!(Arc::ptr_eq(&cart, &store.snapshot()));
        assert_eq!(cart.lines().copied().collect::<Vec<_>>(), expected.lines().copied().collect::<Vec<_>>());
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), Price::from_cents(3500));
        assert_eq!(*store.item_count().borrow(), 3);
        assert_eq!(*store.total().borrow(), Price::from_cents(3500));
    }

    #[tokio::test]
    async fn test_sync_failure_leaves_cart_untouched() {
        let store = open_store(InMemoryCartService::new()).await;
        store.add_to_cart(&record(1, "Abbey Road", 3, 2500)).await.unwrap();
        let before = store.snapshot();
        store.service().fail_reads(true);

        assert!(store.sync_cart_with_backend(&email()).await.is_err());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_status_failure_falls_back_to_enabled() {
        let service = InMemoryCartService::new();
        service.set_enabled(false);
        service.fail_status(true);
        let store = store(service);

        assert!(store.get_cart_status(&email()).await);
        store.establish_session(&email()).await.unwrap();
        assert!(store.snapshot().is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_status_resets_cart() {
        let service = InMemoryCartService::new()
            .with_line(CartLine::new(record(1, "", 0, 0).id, 2, Price::from_cents(1000)));
        service.set_enabled(false);
        let store = store(service);

        let cart = store.establish_session(&email()).await.unwrap();

        assert!(!cart.is_enabled());
        assert!(cart.is_empty());
        assert_eq!(store.session(), Some(email()));
    }

    #[tokio::test]
    async fn test_switching_user_clears_previous_cart() {
        let store = open_store(InMemoryCartService::new()).await;
        store.add_to_cart(&record(1, "Abbey Road", 3, 2500)).await.unwrap();
        store.service().clear_lines();

        let other = Email::parse("other@example.com").unwrap();
        let cart = store.establish_session(&other).await.unwrap();

        assert!(cart.is_empty());
        assert_eq!(store.session(), Some(other));
    }

    #[tokio::test]
    async fn test_reset_and_end_session_zero_derived_streams() {
        let store = open_store(InMemoryCartService::new()).await;
        let mut count = store.item_count();
        let mut total = store.total();
        store.add_to_cart(&record(1, "Abbey Road", 3, 2500)).await.unwrap();
        assert!(count.has_changed().unwrap());
        assert_eq!(*count.borrow_and_update(), 1);
        assert_eq!(*total.borrow_and_update(), Price::from_cents(2500));

        store.reset_cart();
        assert_eq!(*count.borrow_and_update(), 0);
        assert_eq!(*total.borrow_and_update(), Price::ZERO);
        assert!(!store.snapshot().is_enabled());
        assert!(store.session().is_some());

        store.end_session();
        assert!(store.session().is_none());
        assert!(!count.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_rolls_back() {
        let service = InMemoryCartService::new();
        let store = CartStore::new(service, StockChannel::new(), Duration::from_millis(250));
        store.establish_session(&email()).await.unwrap();
        store.service().hang_mutations(true);
        let abbey = record(1, "Abbey Road", 3, 2500);

        let err = store.add_to_cart(&abbey).await.unwrap_err();

        assert!(matches!(
            err,
            CartError::Transport(TransportError::Timeout { operation: "add_to_cart", .. })
        ));
        assert_eq!(store.quantity_of(abbey.id), 0);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(3));
    }

    #[tokio::test]
    async fn test_sync_during_failed_add_keeps_server_units() {
        let abbey = record(1, "Abbey Road", 3, 2500);
        let service = InMemoryCartService::new().with_line(CartLine::new(abbey.id, 1, abbey.price));
        let gate = service.hold_mutations();
        let store = open_store(service).await;
        store.service().fail_mutations(true);

        let sync_then_release = async {
            assert!(crate::testing::eventually(|| store.service().active_calls() == 1).await);
            let synced = store.sync_cart_with_backend(&email()).await.unwrap();
            gate.add_permits(1);
            synced.quantity_of(abbey.id)
        };
        let (result, during_sync) = tokio::join!(store.add_to_cart(&abbey), sync_then_release);

        assert!(result.unwrap_err().is_transport());
        assert_eq!(during_sync, 2);
        assert_eq!(store.quantity_of(abbey.id), 1);
        assert_eq!(store.service().server_lines()[0].quantity, 1);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(3));
        assert_totals_consistent(&store.snapshot());
    }

    #[tokio::test]
    async fn test_sync_during_successful_add_keeps_confirmed_unit() {
        let service = InMemoryCartService::new();
        let gate = service.hold_mutations();
        let store = open_store(service).await;
        let abbey = record(1, "Abbey Road", 3, 2500);

        let sync_then_release = async {
            assert!(crate::testing::eventually(|| store.service().active_calls() == 1).await);
            let synced = store.sync_cart_with_backend(&email()).await.unwrap();
            gate.add_permits(1);
            synced.quantity_of(abbey.id)
        };
        let (outcome, during_sync) = tokio::join!(store.add_to_cart(&abbey), sync_then_release);

        assert_eq!(during_sync, 1);
        assert_eq!(
            outcome.unwrap(),
            CartOutcome { record_id: abbey.id, quantity: 1, stock: 2 }
        );
        assert_eq!(store.service().server_lines(), vec![CartLine::new(abbey.id, 1, abbey.price)]);
        // Session open, the sync that raced the add, and the resync after it.
        assert_eq!(store.service().read_calls(), 3);
        assert_totals_consistent(&store.snapshot());
    }

    #[tokio::test]
    async fn test_sync_during_failed_remove_restores_line() {
        let abbey = record(1, "Abbey Road", 3, 2500);
        let service = InMemoryCartService::new().with_line(CartLine::new(abbey.id, 2, abbey.price));
        let gate = service.hold_mutations();
        let store = open_store(service).await;
        store.service().fail_mutations(true);

        let sync_then_release = async {
            assert!(crate::testing::eventually(|| store.service().active_calls() == 1).await);
            let synced = store.sync_cart_with_backend(&email()).await.unwrap();
            gate.add_permits(1);
            synced.quantity_of(abbey.id)
        };
        let (result, during_sync) = tokio::join!(store.remove_from_cart(&abbey), sync_then_release);

        assert!(result.unwrap_err().is_transport());
        assert_eq!(during_sync, 1);
        assert_eq!(store.quantity_of(abbey.id), 2);
        assert_eq!(store.snapshot().total(), Price::from_cents(5000));
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(3));
    }

    #[tokio::test]
    async fn test_stock_seed_during_failed_add_restores_seeded_value() {
        let service = InMemoryCartService::new();
        let gate = service.hold_mutations();
        let store = open_store(service).await;
        store.service().fail_mutations(true);
        let abbey = record(1, "Abbey Road", 3, 2500);

        let seed_then_release = async {
            assert!(crate::testing::eventually(|| store.service().active_calls() == 1).await);
            let published = store.seed_stock(abbey.id, 5);
            gate.add_permits(1);
            published
        };
        let (result, published) = tokio::join!(store.add_to_cart(&abbey), seed_then_release);

        assert!(result.is_err());
        assert_eq!(published, 4);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(5));
        assert_eq!(store.quantity_of(abbey.id), 0);
    }

    #[tokio::test]
    async fn test_seed_without_pending_change_publishes_as_is() {
        let store = open_store(InMemoryCartService::new()).await;
        let abbey = record(1, "Abbey Road", 3, 2500);

        assert_eq!(store.seed_stock(abbey.id, 7), 7);
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(7));
    }

    #[tokio::test]
    async fn test_failed_remove_after_logout_does_not_restore_line() {
        let abbey = record(1, "Abbey Road", 3, 2500);
        let service = InMemoryCartService::new().with_line(CartLine::new(abbey.id, 1, abbey.price));
        let gate = service.hold_mutations();
        let store = open_store(service).await;
        store.service().fail_mutations(true);

        let logout_then_release = async {
            assert!(crate::testing::eventually(|| store.service().active_calls() == 1).await);
            store.end_session();
            gate.add_permits(1);
        };
        let (result, ()) = tokio::join!(store.remove_from_cart(&abbey), logout_then_release);

        assert!(result.is_err());
        assert!(store.snapshot().is_empty());
        assert!(store.session().is_none());
        assert_eq!(store.stock_channel().stock_of(abbey.id), Some(3));
    }

    #[tokio::test]
    async fn test_abandoned_add_is_not_applied_to_later_syncs() {
        let service = InMemoryCartService::new();
        service.hang_mutations(true);
        let store = open_store(service).await;
        let abbey = record(1, "Abbey Road", 3, 2500);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), store.add_to_cart(&abbey)).await;
        assert!(abandoned.is_err());
        assert!(!store.is_in_flight(abbey.id));

        let cart = store.sync_cart_with_backend(&email()).await.unwrap();
        assert_eq!(cart.quantity_of(abbey.id), 0);
    }
}
