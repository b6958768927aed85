//! Session cart ownership and synchronization.
//!
//! [`CartStore`] is the single writer of the session's [`CartState`]. Readers
//! take `Arc` snapshots or subscribe to the derived `watch` streams:
//!
//! ```rust,ignore
//! let store = Arc::new(CartStore::new(client, StockChannel::new(), config.request_timeout));
//! store.establish_session(&email).await?;
//!
//! let mut count = store.item_count();
//! store.add_to_cart(&record).await?;
//! assert!(count.has_changed()?);
//! ```
//!
//! [`CartState`]: record_store_core::CartState

mod in_flight;
mod store;

pub use store::{CartOutcome, CartStore};
