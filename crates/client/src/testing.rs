//! In-memory collaborators and fixtures for tests.
//!
//! Enabled for this crate's unit tests and, through the `test-support`
//! feature, for downstream test crates.

#![allow(clippy::missing_panics_doc)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use record_store_core::{
    CartLine, CartMutation, CartStatus, Email, Genre, GenreId, Group, GroupDraft, GroupId, Price,
    Record, RecordId, Role, User,
};
use tokio::sync::Semaphore;

use crate::error::TransportError;
use crate::remote::{
    CartService, GenresProvider, GroupsAdmin, GroupsProvider, RecordsProvider, UsersProvider,
};

/// Email of the default test session.
#[must_use]
pub fn email() -> Email {
    Email::parse("shopper@example.com").unwrap_or_else(|_| unreachable!())
}

/// A record by "The Beatles" in group 1.
#[must_use]
pub fn record(id: i32, title: &str, stock: u32, price_cents: i64) -> Record {
    Record {
        id: RecordId::new(id),
        title: title.to_string(),
        year_of_publication: Some(1969),
        price: Price::from_cents(price_cents),
        stock,
        quantity_in_cart: 0,
        group_id: Some(GroupId::new(1)),
        group_name: "The Beatles".to_string(),
        image_url: Some(format!("https://images.example.com/records/{id}.jpg")),
        discontinued: false,
    }
}

#[must_use]
pub fn group(id: i32, name: &str, genre: &str) -> Group {
    Group {
        id: GroupId::new(id),
        name: name.to_string(),
        image_url: Some(format!("https://images.example.com/groups/{id}.jpg")),
        genre_id: Some(GenreId::new(1)),
        genre_name: genre.to_string(),
    }
}

#[must_use]
pub fn genre(id: i32, name: &str) -> Genre {
    Genre {
        id: GenreId::new(id),
        name: name.to_string(),
    }
}

#[must_use]
pub fn user(address: &str, role: Role) -> User {
    User {
        email: Email::parse(address).unwrap_or_else(|_| unreachable!()),
        name: None,
        role: Some(role),
    }
}

/// Poll `condition` between scheduler yields until it holds.
///
/// Returns whether it held before giving up.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}

#[derive(Debug, Default)]
struct CartFake {
    lines: BTreeMap<RecordId, CartLine>,
    stock: HashMap<RecordId, u32>,
    reported_stock: HashMap<RecordId, u32>,
    disabled: bool,
    fail_mutations: bool,
    fail_reads: bool,
    fail_status: bool,
    hang: bool,
    omit_stock: bool,
    gate: Option<Arc<Semaphore>>,
}

/// Remote cart kept in memory, with switchable failures.
///
/// Server stock for a record is seeded from the first `Record` it sees.
#[derive(Debug, Default)]
pub struct InMemoryCartService {
    state: Mutex<CartFake>,
    adds: AtomicUsize,
    removes: AtomicUsize,
    reads: AtomicUsize,
    status_checks: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveCall<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveCall<'a> {
    fn enter(service: &'a InMemoryCartService) -> Self {
        let now = service.active.fetch_add(1, Ordering::SeqCst) + 1;
        service.peak.fetch_max(now, Ordering::SeqCst);
        Self {
            active: &service.active,
        }
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryCartService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CartFake> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a server-side cart line.
    #[must_use]
    pub fn with_line(self, line: CartLine) -> Self {
        self.lock().lines.insert(line.record_id, line);
        self
    }

    /// Seed the server stock of a record.
    #[must_use]
    pub fn with_stock(self, record_id: RecordId, stock: u32) -> Self {
        self.lock().stock.insert(record_id, stock);
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.lock().disabled = !enabled;
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.lock().fail_mutations = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn fail_status(&self, fail: bool) {
        self.lock().fail_status = fail;
    }

    /// Make add and remove never answer.
    pub fn hang_mutations(&self, hang: bool) {
        self.lock().hang = hang;
    }

    /// Answer mutations of `record_id` with this stock instead of the real one.
    pub fn report_stock(&self, record_id: RecordId, stock: u32) {
        self.lock().reported_stock.insert(record_id, stock);
    }

    /// Answer mutations without a stock value.
    pub fn omit_stock(&self, omit: bool) {
        self.lock().omit_stock = omit;
    }

    /// Hold every following add and remove until a permit is added to the
    /// returned semaphore.
    #[must_use]
    pub fn hold_mutations(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.lock().gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn clear_lines(&self) {
        self.lock().lines.clear();
    }

    #[must_use]
    pub fn server_lines(&self) -> Vec<CartLine> {
        self.lock().lines.values().copied().collect()
    }

    #[must_use]
    pub fn server_stock(&self, record_id: RecordId) -> Option<u32> {
        self.lock().stock.get(&record_id).copied()
    }

    #[must_use]
    pub fn add_calls(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn remove_calls(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    /// Mutations currently inside the service.
    #[must_use]
    pub fn active_calls(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of mutations that were inside the service at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter_mutation(&self) -> ActiveCall<'_> {
        let call = ActiveCall::enter(self);
        let (gate, hang) = {
            let state = self.lock();
            (state.gate.clone(), state.hang)
        };
        if let Some(gate) = gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        if hang {
            std::future::pending::<()>().await;
        }
        call
    }

    fn mutation(state: &CartFake, record_id: RecordId, stock: u32, quantity: u32) -> CartMutation {
        let reported = state.reported_stock.get(&record_id).copied().unwrap_or(stock);
        CartMutation {
            record_id,
            stock: (!state.omit_stock).then_some(reported),
            quantity: Some(quantity),
        }
    }
}

fn injected(what: &str) -> TransportError {
    TransportError::Unavailable(format!("injected {what} failure"))
}

impl CartService for InMemoryCartService {
    async fn get_cart_items(&self, _email: &Email) -> Result<Vec<CartLine>, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.fail_reads {
            return Err(injected("read"));
        }
        Ok(state.lines.values().copied().collect())
    }

    async fn add_to_cart(
        &self,
        _email: &Email,
        record: &Record,
    ) -> Result<CartMutation, TransportError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        let _call = self.enter_mutation().await;

        let mut state = self.lock();
        if state.fail_mutations {
            return Err(injected("add"));
        }
        let stock = *state.stock.entry(record.id).or_insert(record.stock);
        if stock == 0 {
            return Err(TransportError::Status {
                status: 409,
                message: Some("Record is out of stock".to_string()),
            });
        }
        state.stock.insert(record.id, stock - 1);
        let line = state
            .lines
            .entry(record.id)
            .or_insert_with(|| CartLine::new(record.id, 0, record.price));
        line.quantity += 1;
        let quantity = line.quantity;
        Ok(Self::mutation(&state, record.id, stock - 1, quantity))
    }

    async fn remove_from_cart(
        &self,
        _email: &Email,
        record: &Record,
    ) -> Result<CartMutation, TransportError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        let _call = self.enter_mutation().await;

        let mut state = self.lock();
        if state.fail_mutations {
            return Err(injected("remove"));
        }
        let Some(line) = state.lines.get_mut(&record.id) else {
            return Err(TransportError::Status {
                status: 404,
                message: Some("Record is not in the cart".to_string()),
            });
        };
        line.quantity = line.quantity.saturating_sub(1);
        let quantity = line.quantity;
        if quantity == 0 {
            state.lines.remove(&record.id);
        }
        let stock = state.stock.get(&record.id).copied().unwrap_or(record.stock) + 1;
        state.stock.insert(record.id, stock);
        Ok(Self::mutation(&state, record.id, stock, quantity))
    }

    async fn get_cart_status(&self, _email: &Email) -> Result<CartStatus, TransportError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.fail_status {
            return Err(injected("status"));
        }
        Ok(CartStatus {
            enabled: !state.disabled,
        })
    }
}

#[derive(Debug, Default)]
struct CatalogFake {
    records: HashMap<GroupId, Vec<Record>>,
    groups: Vec<Group>,
    fail_records: bool,
    fail_group_names: bool,
    fail_groups: Option<Option<String>>,
    genres: Vec<Genre>,
    fail_genres: Option<Option<String>>,
    fail_writes: Option<Option<String>>,
    next_id: i32,
}

/// Records and groups kept in memory, with switchable failures.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogFake>,
    record_reads: AtomicUsize,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CatalogFake> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a group and the records it publishes.
    #[must_use]
    pub fn with_group(self, group: Group, records: Vec<Record>) -> Self {
        {
            let mut state = self.lock();
            state.records.insert(group.id, records);
            state.groups.push(group);
        }
        self
    }

    #[must_use]
    pub fn with_genre(self, genre: Genre) -> Self {
        self.lock().genres.push(genre);
        self
    }

    pub fn set_records(&self, group_id: GroupId, records: Vec<Record>) {
        self.lock().records.insert(group_id, records);
    }

    pub fn fail_records(&self, fail: bool) {
        self.lock().fail_records = fail;
    }

    pub fn fail_group_names(&self, fail: bool) {
        self.lock().fail_group_names = fail;
    }

    /// Fail the group list, with an optional server message.
    pub fn fail_groups(&self, message: Option<&str>) {
        self.lock().fail_groups = Some(message.map(str::to_string));
    }

    /// Fail the genre list, with an optional server message.
    pub fn fail_genres(&self, message: Option<&str>) {
        self.lock().fail_genres = Some(message.map(str::to_string));
    }

    /// Fail every genre and group write, with an optional server message.
    pub fn fail_writes(&self, message: Option<&str>) {
        self.lock().fail_writes = Some(message.map(str::to_string));
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_records = false;
        state.fail_group_names = false;
        state.fail_groups = None;
        state.fail_genres = None;
        state.fail_writes = None;
    }

    #[must_use]
    pub fn record_reads(&self) -> usize {
        self.record_reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn genres(&self) -> Vec<Genre> {
        self.lock().genres.clone()
    }

    #[must_use]
    pub fn groups(&self) -> Vec<Group> {
        self.lock().groups.clone()
    }
}

impl CatalogFake {
    fn write(&mut self) -> Result<i32, TransportError> {
        if let Some(message) = &self.fail_writes {
            return Err(TransportError::Status {
                status: 400,
                message: message.clone(),
            });
        }
        self.next_id += 1;
        Ok(self.next_id + 100)
    }

    fn group_from(&self, id: GroupId, draft: &GroupDraft) -> Group {
        let genre_name = self
            .genres
            .iter()
            .find(|genre| Some(genre.id) == draft.genre_id)
            .map(|genre| genre.name.clone())
            .unwrap_or_default();
        Group {
            id,
            name: draft.name.clone(),
            image_url: draft.image_url.clone(),
            genre_id: draft.genre_id,
            genre_name,
        }
    }
}

fn not_found(what: &str) -> TransportError {
    TransportError::Status {
        status: 404,
        message: Some(format!("{what} not found")),
    }
}

impl RecordsProvider for InMemoryCatalog {
    async fn get_records_by_group(&self, group_id: GroupId) -> Result<Vec<Record>, TransportError> {
        self.record_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.fail_records {
            return Err(injected("records"));
        }
        Ok(state.records.get(&group_id).cloned().unwrap_or_default())
    }

    async fn get_group_name(&self, group_id: GroupId) -> Result<String, TransportError> {
        let state = self.lock();
        if state.fail_group_names {
            return Err(injected("group name"));
        }
        state
            .groups
            .iter()
            .find(|group| group.id == group_id)
            .map(|group| group.name.clone())
            .ok_or(TransportError::Status {
                status: 404,
                message: Some(format!("Group {group_id} not found")),
            })
    }
}

impl GroupsProvider for InMemoryCatalog {
    async fn get_groups(&self) -> Result<Vec<Group>, TransportError> {
        let state = self.lock();
        if let Some(message) = &state.fail_groups {
            return Err(TransportError::Status {
                status: 500,
                message: message.clone(),
            });
        }
        Ok(state.groups.clone())
    }
}

impl GroupsAdmin for InMemoryCatalog {
    async fn add_group(&self, draft: &GroupDraft) -> Result<(), TransportError> {
        let mut state = self.lock();
        let id = GroupId::new(state.write()?);
        let group = state.group_from(id, draft);
        state.records.insert(id, Vec::new());
        state.groups.push(group);
        Ok(())
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        draft: &GroupDraft,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.write()?;
        let group = state.group_from(group_id, draft);
        let slot = state
            .groups
            .iter_mut()
            .find(|group| group.id == group_id)
            .ok_or_else(|| not_found("Group"))?;
        *slot = group;
        Ok(())
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.write()?;
        let before = state.groups.len();
        state.groups.retain(|group| group.id != group_id);
        if state.groups.len() == before {
            return Err(not_found("Group"));
        }
        state.records.remove(&group_id);
        Ok(())
    }
}

impl GenresProvider for InMemoryCatalog {
    async fn get_genres(&self) -> Result<Vec<Genre>, TransportError> {
        let state = self.lock();
        if let Some(message) = &state.fail_genres {
            return Err(TransportError::Status {
                status: 500,
                message: message.clone(),
            });
        }
        Ok(state.genres.clone())
    }

    async fn add_genre(&self, name: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        let id = GenreId::new(state.write()?);
        state.genres.push(Genre {
            id,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn update_genre(&self, genre: &Genre) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.write()?;
        let slot = state
            .genres
            .iter_mut()
            .find(|existing| existing.id == genre.id)
            .ok_or_else(|| not_found("Genre"))?;
        slot.name.clone_from(&genre.name);
        Ok(())
    }

    async fn delete_genre(&self, genre_id: GenreId) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.write()?;
        let before = state.genres.len();
        state.genres.retain(|genre| genre.id != genre_id);
        if state.genres.len() == before {
            return Err(not_found("Genre"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UsersFake {
    users: Vec<User>,
    fail_reads: Option<u16>,
    fail_deletes: bool,
}

/// Registered users kept in memory, with switchable failures.
#[derive(Debug, Default)]
pub struct InMemoryUsers {
    state: Mutex<UsersFake>,
    reads: AtomicUsize,
}

impl InMemoryUsers {
    #[must_use]
    pub fn new(users: Vec<User>) -> Self {
        Self {
            state: Mutex::new(UsersFake {
                users,
                ..UsersFake::default()
            }),
            reads: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UsersFake> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer the user list with `status`, or succeed again with `None`.
    pub fn fail_reads(&self, status: Option<u16>) {
        self.lock().fail_reads = status;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl UsersProvider for InMemoryUsers {
    async fn get_users(&self) -> Result<Vec<User>, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if let Some(status) = state.fail_reads {
            return Err(TransportError::Status {
                status,
                message: None,
            });
        }
        Ok(state.users.clone())
    }

    async fn delete_user(&self, email: &Email) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.fail_deletes {
            return Err(injected("user delete"));
        }
        let before = state.users.len();
        state.users.retain(|user| &user.email != email);
        if state.users.len() == before {
            return Err(not_found("User"));
        }
        Ok(())
    }
}
