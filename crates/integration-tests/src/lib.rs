//! Integration tests for the record store client.
//!
//! Scenarios run against the in-memory collaborators from
//! `record_store_client::testing`, wiring the cart store, the session bridge
//! and record list controllers together the way an application does.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p record-store-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_flow` - Sign-in, browsing and cart changes through one screen
//! - `stock_sync` - Several screens sharing stock and cart state
//! - `admin` - Administration screens editing the catalog the shop lists

use std::sync::Arc;
use std::time::Duration;

use record_store_client::cart::CartStore;
use record_store_client::catalog::RecordListController;
use record_store_client::session::{LocalSession, SessionBridge};
use record_store_client::stock::StockChannel;
use record_store_client::testing::{InMemoryCartService, InMemoryCatalog, email, eventually, group, record};
use record_store_core::{GroupId, Record, Role};

/// Deadline for remote calls in scenarios.
pub const DEADLINE: Duration = Duration::from_secs(5);

pub const BEATLES: GroupId = GroupId::new(1);

pub type Store = CartStore<InMemoryCartService>;
pub type RecordList = RecordListController<Arc<InMemoryCatalog>, InMemoryCartService>;

/// Abbey Road (stock 3), Let It Be (stock 5) and Revolver (sold out).
#[must_use]
pub fn beatles_records() -> Vec<Record> {
    vec![
        record(1, "Abbey Road", 3, 2500),
        record(2, "Let It Be", 5, 2200),
        record(3, "Revolver", 0, 2000),
    ]
}

/// An application with a signed-out session.
pub struct TestApp {
    pub catalog: Arc<InMemoryCatalog>,
    pub store: Arc<Store>,
    pub session: LocalSession,
    pub bridge: SessionBridge<InMemoryCartService>,
}

impl TestApp {
    /// Start the application. Must be called within a Tokio runtime.
    #[must_use]
    pub fn start(service: InMemoryCartService) -> Self {
        let catalog = Arc::new(
            InMemoryCatalog::new().with_group(group(1, "The Beatles", "Rock"), beatles_records()),
        );
        let store = Arc::new(CartStore::new(service, StockChannel::new(), DEADLINE));
        let session = LocalSession::new();
        let bridge = SessionBridge::start(Arc::clone(&store), &session);

        Self {
            catalog,
            store,
            session,
            bridge,
        }
    }

    /// Sign the default shopper in and wait until the cart session is open.
    ///
    /// Returns whether the session was established in time.
    pub async fn sign_in(&self) -> bool {
        self.session.sign_in(email(), Role::User);
        eventually(|| {
            self.store.session().is_some()
                && self.store.service().status_calls() > 0
                && (self.store.snapshot().synced_at().is_some()
                    || !self.store.snapshot().is_enabled())
        })
        .await
    }

    /// Open a record list screen.
    #[must_use]
    pub fn record_list(&self) -> RecordList {
        RecordListController::open(Arc::clone(&self.catalog), Arc::clone(&self.store))
    }
}
