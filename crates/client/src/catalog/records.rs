//! Record list of one group.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use record_store_core::{CartState, GroupId, Record, RecordId, StockEvent};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::PhotoPreview;
use crate::cart::{CartOutcome, CartStore};
use crate::error::{CartError, TransportError, ValidationError};
use crate::remote::{CartService, RecordsProvider, within_deadline};
use crate::stock::StockSubscription;

type RecordList = Arc<Vec<Arc<Record>>>;

const LOAD_RECORDS_FAILED: &str = "Error loading records";
const LOAD_GROUP_NAME_FAILED: &str = "Error loading group name";
const ADD_FAILED: &str = "Error adding to cart";
const REMOVE_FAILED: &str = "Error removing from cart";

/// Informational message that is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    NoRecords,
}

impl Notice {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NoRecords => "No records found for this group",
        }
    }
}

/// Result of a successful [`RecordListController::load_records`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    Empty,
}

/// Render state of the record list.
///
/// Every update produces new list containers; records that did not change
/// keep their `Arc`, so a renderer can skip them by pointer comparison.
#[derive(Debug, Clone, Default)]
pub struct RecordListView {
    pub group_id: Option<GroupId>,
    pub group_name: String,
    pub records: RecordList,
    pub filtered: RecordList,
    pub search_text: String,
    pub loading: bool,
    pub error: Option<String>,
    pub notice: Option<Notice>,
    pub photo: PhotoPreview<RecordId>,
    pub cart_enabled: bool,
    pub cart_item_count: u32,
}

impl RecordListView {
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Record from the full list.
    #[must_use]
    pub fn record(&self, record_id: RecordId) -> Option<&Arc<Record>> {
        self.records.iter().find(|record| record.id == record_id)
    }

    fn refilter(&mut self) {
        let needle = self.search_text.trim().to_lowercase();
        self.filtered = Arc::new(
            self.records
                .iter()
                .filter(|record| record.matches(&needle))
                .map(Arc::clone)
                .collect(),
        );
    }

    fn apply_stock(&mut self, event: &StockEvent) {
        if self.record(event.record_id).is_none() {
            return;
        }
        let update = |record: &Record| {
            (record.id == event.record_id && record.stock != event.new_stock).then(|| Record {
                stock: event.new_stock,
                ..record.clone()
            })
        };
        self.records = replace_where(&self.records, update);
        self.filtered = replace_where(&self.filtered, update);
    }

    fn apply_cart(&mut self, cart: &CartState) {
        let update = |record: &Record| {
            let quantity = cart.quantity_of(record.id);
            (record.quantity_in_cart != quantity).then(|| Record {
                quantity_in_cart: quantity,
                ..record.clone()
            })
        };
        self.records = replace_where(&self.records, update);
        self.filtered = replace_where(&self.filtered, update);
        self.cart_enabled = cart.is_enabled();
        self.cart_item_count = cart.item_count();
    }
}

/// New container in which records `update` returns a replacement for are
/// swapped; all others keep their `Arc`.
fn replace_where(list: &RecordList, update: impl Fn(&Record) -> Option<Record>) -> RecordList {
    Arc::new(
        list.iter()
            .map(|record| update(record).map_or_else(|| Arc::clone(record), Arc::new))
            .collect(),
    )
}

fn lock(view: &Mutex<RecordListView>) -> MutexGuard<'_, RecordListView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controller of the record list screen.
///
/// Subscribes to the stock channel and the cart stream on [`open`] and keeps
/// both lists of its view current until [`teardown`] or drop.
///
/// [`open`]: RecordListController::open
/// [`teardown`]: RecordListController::teardown
pub struct RecordListController<R, S> {
    records: R,
    cart: Arc<CartStore<S>>,
    view: Arc<Mutex<RecordListView>>,
    subscription: StockSubscription,
    watcher: Option<JoinHandle<()>>,
}

impl<R, S> RecordListController<R, S>
where
    R: RecordsProvider,
    S: CartService,
{
    /// Open the screen. Must be called within a Tokio runtime.
    pub fn open(records: R, cart: Arc<CartStore<S>>) -> Self {
        let view = Arc::new(Mutex::new(RecordListView::default()));
        lock(&view).apply_cart(&cart.snapshot());

        let stock_view = Arc::clone(&view);
        let subscription = cart
            .stock_channel()
            .subscribe(move |event| lock(&stock_view).apply_stock(event));

        let mut snapshots = cart.subscribe();
        let cart_view = Arc::clone(&view);
        let watcher = tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                lock(&cart_view).apply_cart(&snapshot);
            }
        });

        Self {
            records,
            cart,
            view,
            subscription,
            watcher: Some(watcher),
        }
    }

    /// Current render state.
    #[must_use]
    pub fn view(&self) -> RecordListView {
        lock(&self.view).clone()
    }

    #[must_use]
    pub const fn provider(&self) -> &R {
        &self.records
    }

    #[must_use]
    pub const fn cart(&self) -> &Arc<CartStore<S>> {
        &self.cart
    }

    fn update(&self, f: impl FnOnce(&mut RecordListView)) {
        f(&mut lock(&self.view));
    }

    /// Load the records of `group_id`, then its name.
    ///
    /// The cart is synchronized first when a session is active. An empty group
    /// clears the lists and sets [`Notice::NoRecords`].
    ///
    /// # Errors
    ///
    /// Returns the transport error when the records cannot be fetched; the
    /// view keeps its previous lists and shows "Error loading records". A
    /// failed group name only sets the view's error.
    #[instrument(skip(self), fields(group_id = %group_id))]
    pub async fn load_records(&self, group_id: GroupId) -> Result<LoadOutcome, TransportError> {
        self.update(|view| {
            view.loading = true;
            view.error = None;
            view.notice = None;
            view.group_id = Some(group_id);
        });

        if let Some(email) = self.cart.session()
            && let Err(err) = self.cart.sync_cart_with_backend(&email).await
        {
            warn!(error = %err, "Cart sync before loading records failed");
        }

        let deadline = self.cart.deadline();
        let fetched = within_deadline(
            "get_records_by_group",
            deadline,
            self.records.get_records_by_group(group_id),
        )
        .await;
        let mut records = match fetched {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "Failed to load records");
                self.update(|view| {
                    view.loading = false;
                    view.error = Some(LOAD_RECORDS_FAILED.to_string());
                });
                return Err(err);
            }
        };

        if records.is_empty() {
            debug!("Group has no records");
            self.update(|view| {
                view.records = RecordList::default();
                view.filtered = RecordList::default();
                view.notice = Some(Notice::NoRecords);
                view.loading = false;
            });
            return Ok(LoadOutcome::Empty);
        }

        // Seeding publishes to our own handler, so the view lock must not be held.
        // A change awaiting the server stays applied to the seeded stock.
        for record in &mut records {
            record.stock = self.cart.seed_stock(record.id, record.stock);
        }

        let snapshot = self.cart.snapshot();
        let records: Vec<Arc<Record>> = records
            .into_iter()
            .map(|mut record| {
                record.quantity_in_cart = snapshot.quantity_of(record.id);
                Arc::new(record)
            })
            .collect();
        let count = records.len();
        self.update(|view| {
            view.records = Arc::new(records);
            view.refilter();
            view.apply_cart(&snapshot);
            view.loading = false;
        });
        debug!(count, "Records loaded");

        match within_deadline(
            "get_group_name",
            deadline,
            self.records.get_group_name(group_id),
        )
        .await
        {
            Ok(name) => self.update(|view| view.group_name = name),
            Err(err) => {
                warn!(error = %err, "Failed to load group name");
                self.update(|view| view.error = Some(LOAD_GROUP_NAME_FAILED.to_string()));
            }
        }

        Ok(LoadOutcome::Loaded(count))
    }

    /// Filter by title, group name or year. Empty text shows every record.
    pub fn filter_records(&self, search_text: &str) {
        self.update(|view| {
            view.search_text = search_text.to_string();
            view.refilter();
        });
    }

    fn find(&self, record_id: RecordId) -> Result<Arc<Record>, ValidationError> {
        lock(&self.view)
            .record(record_id)
            .cloned()
            .ok_or(ValidationError::UnknownRecord(record_id))
    }

    /// Bring quantities in line with the store right away instead of waiting
    /// for the cart watcher.
    fn refresh_from_cart(&self) {
        let snapshot = self.cart.snapshot();
        self.update(|view| view.apply_cart(&snapshot));
    }

    fn finish(&self, result: &Result<CartOutcome, CartError>, fallback: &str) {
        self.refresh_from_cart();
        if let Err(err) = result
            && err.is_transport()
        {
            let message = err.user_message(fallback);
            self.update(|view| view.error = Some(message));
        }
    }

    /// Add one unit of a listed record to the cart.
    ///
    /// # Errors
    ///
    /// Returns the store's error. Only transport failures set the view's
    /// error message; rejected preconditions are returned silently.
    pub async fn add_to_cart(&self, record_id: RecordId) -> Result<CartOutcome, CartError> {
        let record = self.find(record_id)?;
        self.update(|view| view.error = None);

        let result = self.cart.add_to_cart(&record).await;
        self.finish(&result, ADD_FAILED);
        result
    }

    /// Remove one unit of a listed record from the cart.
    ///
    /// # Errors
    ///
    /// Same as [`RecordListController::add_to_cart`].
    pub async fn remove_record(&self, record_id: RecordId) -> Result<CartOutcome, CartError> {
        let record = self.find(record_id)?;
        self.update(|view| view.error = None);

        let result = self.cart.remove_from_cart(&record).await;
        self.finish(&result, REMOVE_FAILED);
        result
    }

    /// Toggle the image preview of a listed record.
    ///
    /// Returns `false` if the record is not listed.
    pub fn show_image(&self, record_id: RecordId) -> bool {
        let mut view = lock(&self.view);
        let Some(url) = view.record(record_id).map(|record| record.image_url.clone()) else {
            return false;
        };
        view.photo.toggle(record_id, url.as_deref());
        true
    }
}

impl<R, S> RecordListController<R, S> {
    /// Stop following stock and cart changes. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.subscription.dispose();
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
            debug!("Record list torn down");
        }
    }

    /// Whether the controller still follows stock and cart changes.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

impl<R, S> Drop for RecordListController<R, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use record_store_core::Price;

    use super::*;
    use crate::stock::StockChannel;
    use crate::testing::{InMemoryCartService, InMemoryCatalog, email, eventually, group, record};

    type Controller = RecordListController<InMemoryCatalog, InMemoryCartService>;

    const BEATLES: GroupId = GroupId::new(1);

    fn beatles() -> Vec<Record> {
        vec![
            record(1, "Abbey Road", 3, 2500),
            record(2, "Let It Be", 5, 2200),
            record(3, "Revolver", 0, 2000),
        ]
    }

    async fn open(records: Vec<Record>) -> (Controller, Arc<CartStore<InMemoryCartService>>) {
        let catalog = InMemoryCatalog::new().with_group(group(1, "The Beatles", "Rock"), records);
        let store = Arc::new(CartStore::new(
            InMemoryCartService::new(),
            StockChannel::new(),
            Duration::from_secs(5),
        ));
        store.establish_session(&email()).await.unwrap();
        (RecordListController::open(catalog, Arc::clone(&store)), store)
    }

    fn stock_and_quantity(view: &RecordListView, id: i32) -> (u32, u32) {
        let record = view.record(RecordId::new(id)).unwrap();
        (record.stock, record.quantity_in_cart)
    }

    #[tokio::test]
    async fn test_load_seeds_stock_and_group_name() {
        let (controller, store) = open(beatles()).await;

        let outcome = controller.load_records(BEATLES).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded(3));
        let view = controller.view();
        assert_eq!(view.group_name, "The Beatles");
        assert_eq!(view.filtered.len(), 3);
        assert!(!view.loading);
        assert!(!view.has_error());
        assert!(view.cart_enabled);
        assert_eq!(store.stock_channel().stock_of(RecordId::new(1)), Some(3));
    }

    #[tokio::test]
    async fn test_load_seeds_quantities_from_cart() {
        let (controller, store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        controller.add_to_cart(RecordId::new(2)).await.unwrap();

        controller.load_records(BEATLES).await.unwrap();

        assert_eq!(stock_and_quantity(&controller.view(), 2), (5, 1));
        assert_eq!(store.service().read_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_group_sets_notice_not_error() {
        let (controller, _store) = open(Vec::new()).await;

        let outcome = controller.load_records(BEATLES).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Empty);
        let view = controller.view();
        assert_eq!(view.notice, Some(Notice::NoRecords));
        assert!(!view.has_error());
        assert!(view.records.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_keeps_prior_lists() {
        let (controller, _store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        let before = controller.view();
        controller.provider().fail_records(true);

        assert!(controller.load_records(BEATLES).await.is_err());

        let view = controller.view();
        assert_eq!(view.error.as_deref(), Some("Error loading records"));
        assert!(!view.loading);
        assert!(Arc::ptr_eq(&before.records, &view.records));
    }

    #[tokio::test]
    async fn test_group_name_failure_keeps_records() {
        let (controller, _store) = open(beatles()).await;
        controller.provider().fail_group_names(true);

        assert!(controller.load_records(BEATLES).await.is_ok());

        let view = controller.view();
        assert_eq!(view.error.as_deref(), Some("Error loading group name"));
        assert_eq!(view.records.len(), 3);
    }

    #[tokio::test]
    async fn test_stock_event_replaces_only_matching_record() {
        let (controller, store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        let before = controller.view();

        store.stock_channel().update_stock(RecordId::new(2), 4);

        let after = controller.view();
        assert!(!Arc::ptr_eq(&before.records, &after.records));
        assert!(!Arc::ptr_eq(&before.filtered, &after.filtered));
        assert!(Arc::ptr_eq(&before.records[0], &after.records[0]));
        assert!(Arc::ptr_eq(&before.records[2], &after.records[2]));
        assert!(Arc::ptr_eq(&before.filtered[0], &after.filtered[0]));
        assert_eq!(after.records[1].stock, 4);
        assert_eq!(after.filtered[1].stock, 4);
        assert_eq!(after.records[1].title, "Let It Be");
    }

    #[tokio::test]
    async fn test_add_success_updates_stock_and_quantity() {
        let (controller, _store) = open(vec![record(1, "Abbey Road", 3, 2500)]).await;
        controller.load_records(BEATLES).await.unwrap();

        controller.add_to_cart(RecordId::new(1)).await.unwrap();

        let view = controller.view();
        assert_eq!(stock_and_quantity(&view, 1), (2, 1));
        assert_eq!(view.cart_item_count, 1);
        assert!(!view.has_error());
    }

    #[tokio::test]
    async fn test_add_failure_restores_and_sets_error() {
        let (controller, store) = open(vec![record(1, "Abbey Road", 3, 2500)]).await;
        controller.load_records(BEATLES).await.unwrap();
        store.service().fail_mutations(true);

        let err = controller.add_to_cart(RecordId::new(1)).await.unwrap_err();

        assert!(err.is_transport());
        let view = controller.view();
        assert_eq!(stock_and_quantity(&view, 1), (3, 0));
        assert_eq!(view.error.as_deref(), Some("Error adding to cart"));
    }

    #[tokio::test]
    async fn test_rejected_add_does_not_set_error() {
        let (controller, store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();

        let err = controller.add_to_cart(RecordId::new(3)).await.unwrap_err();

        assert!(matches!(err, CartError::Validation(ValidationError::OutOfStock(_))));
        assert!(!controller.view().has_error());
        assert_eq!(store.service().add_calls(), 0);

        let err = controller.add_to_cart(RecordId::new(99)).await.unwrap_err();
        assert!(matches!(err, CartError::Validation(ValidationError::UnknownRecord(_))));
    }

    #[tokio::test]
    async fn test_remove_restores_stock() {
        let (controller, _store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        controller.add_to_cart(RecordId::new(1)).await.unwrap();

        let outcome = controller.remove_record(RecordId::new(1)).await.unwrap();

        assert_eq!(outcome.quantity, 0);
        assert_eq!(stock_and_quantity(&controller.view(), 1), (3, 0));
    }

    #[tokio::test]
    async fn test_remove_failure_sets_error() {
        let (controller, store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        controller.add_to_cart(RecordId::new(1)).await.unwrap();
        store.service().fail_mutations(true);

        assert!(controller.remove_record(RecordId::new(1)).await.is_err());

        let view = controller.view();
        assert_eq!(view.error.as_deref(), Some("Error removing from cart"));
        assert_eq!(stock_and_quantity(&view, 1), (2, 1));
    }

    #[tokio::test]
    async fn test_search_without_match_keeps_full_list() {
        let (controller, _store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        let before = controller.view();

        controller.filter_records("zz");

        let view = controller.view();
        assert!(view.filtered.is_empty());
        assert!(Arc::ptr_eq(&before.records, &view.records));

        controller.filter_records("LET");
        assert_eq!(controller.view().filtered.len(), 1);
        controller.filter_records("1969");
        assert_eq!(controller.view().filtered.len(), 3);
        controller.filter_records("");
        assert!(!Arc::ptr_eq(&view.filtered, &controller.view().filtered));
        assert_eq!(controller.view().filtered.len(), 3);
    }

    #[tokio::test]
    async fn test_cart_changes_elsewhere_reach_view() {
        let (controller, store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();

        store.add_to_cart(&record(2, "Let It Be", 5, 2200)).await.unwrap();

        assert!(
            eventually(|| stock_and_quantity(&controller.view(), 2) == (4, 1)).await,
            "cart watcher did not apply the new quantity"
        );
        assert_eq!(controller.view().cart_item_count, 1);

        store.reset_cart();
        assert!(eventually(|| !controller.view().cart_enabled).await);
    }

    #[tokio::test]
    async fn test_show_image_toggles_by_id() {
        let (controller, _store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();

        assert!(controller.show_image(RecordId::new(1)));
        assert_eq!(controller.view().photo.selected(), Some(RecordId::new(1)));
        assert!(controller.view().photo.is_visible());
        assert!(controller.show_image(RecordId::new(1)));
        assert!(!controller.view().photo.is_visible());
        assert!(!controller.show_image(RecordId::new(42)));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent_and_detaches() {
        let (mut controller, store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        assert_eq!(store.stock_channel().subscriber_count(), 1);

        controller.teardown();
        controller.teardown();

        assert!(!controller.is_active());
        assert_eq!(store.stock_channel().subscriber_count(), 0);
        store.stock_channel().update_stock(RecordId::new(1), 0);
        assert_eq!(stock_and_quantity(&controller.view(), 1), (3, 0));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (controller, store) = open(beatles()).await;
        drop(controller);
        assert_eq!(store.stock_channel().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_view_total_matches_store() {
        let (controller, store) = open(beatles()).await;
        controller.load_records(BEATLES).await.unwrap();
        controller.add_to_cart(RecordId::new(1)).await.unwrap();
        controller.add_to_cart(RecordId::new(2)).await.unwrap();

        assert_eq!(controller.view().cart_item_count, 2);
        assert_eq!(*store.total().borrow(), Price::from_cents(4700));
    }
}
