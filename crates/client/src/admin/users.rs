//! Registered users.

use std::time::Duration;

use record_store_core::{Email, User};
use tracing::{debug, info, instrument, warn};

use crate::error::TransportError;
use crate::remote::{UsersProvider, within_deadline};

/// Shown when the server refuses the user list to the current session.
pub const USERS_FORBIDDEN: &str =
    "You don't have permission to view users. Please log in as an administrator.";

/// Shown when the user list cannot be fetched for any other reason.
pub const USERS_LOAD_FAILED: &str = "Error loading users. Please try again.";

/// Outcome of a delete, shown as a transient message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserNotice {
    Deleted,
    DeleteFailed,
}

impl UserNotice {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Deleted => "User successfully deleted",
            Self::DeleteFailed => "Error deleting user",
        }
    }

    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::DeleteFailed)
    }
}

/// Render state of the user list.
#[derive(Debug, Clone, Default)]
pub struct UserListView {
    pub users: Vec<User>,
    pub filtered: Vec<User>,
    pub search_text: String,
    pub loading: bool,
    pub error: Option<String>,
    pub notice: Option<UserNotice>,
}

impl UserListView {
    fn refilter(&mut self) {
        let needle = self.search_text.trim().to_lowercase();
        self.filtered = self
            .users
            .iter()
            .filter(|user| user.matches(&needle))
            .cloned()
            .collect();
    }
}

/// Controller of the user administration screen.
#[derive(Debug)]
pub struct UserListController<U> {
    users: U,
    deadline: Duration,
    view: UserListView,
}

impl<U: UsersProvider> UserListController<U> {
    pub fn new(users: U, deadline: Duration) -> Self {
        Self {
            users,
            deadline,
            view: UserListView::default(),
        }
    }

    #[must_use]
    pub const fn view(&self) -> &UserListView {
        &self.view
    }

    #[must_use]
    pub const fn provider(&self) -> &U {
        &self.users
    }

    /// Fetch every user and apply the current filter.
    ///
    /// # Errors
    ///
    /// Returns the transport error. The lists are cleared; a 401 asks for an
    /// administrator login, anything else shows a generic message.
    #[instrument(skip(self))]
    pub async fn load_users(&mut self) -> Result<usize, TransportError> {
        self.view.loading = true;
        self.view.error = None;

        let result = within_deadline("get_users", self.deadline, self.users.get_users()).await;
        self.view.loading = false;

        match result {
            Ok(users) => {
                let count = users.len();
                self.view.users = users;
                self.view.refilter();
                debug!(count, "Users loaded");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "Failed to load users");
                self.view.users.clear();
                self.view.filtered.clear();
                let message = if err.status() == Some(401) {
                    USERS_FORBIDDEN
                } else {
                    USERS_LOAD_FAILED
                };
                self.view.error = Some(message.to_string());
                Err(err)
            }
        }
    }

    /// Case-insensitive match on the email.
    pub fn filter_users(&mut self, search_text: &str) {
        search_text.clone_into(&mut self.view.search_text);
        self.view.refilter();
    }

    /// Delete a user and reload the list.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the delete or the reload. A failed
    /// delete leaves the list as it was.
    #[instrument(skip(self, email))]
    pub async fn delete_user(&mut self, email: &Email) -> Result<(), TransportError> {
        let result =
            within_deadline("delete_user", self.deadline, self.users.delete_user(email)).await;
        if let Err(err) = result {
            warn!(error = %err, "Failed to delete user");
            self.view.notice = Some(UserNotice::DeleteFailed);
            return Err(err);
        }

        info!("User deleted");
        self.view.notice = Some(UserNotice::Deleted);
        self.load_users().await.map(|_| ())
    }

    /// Hide the current notice.
    pub const fn dismiss_notice(&mut self) {
        self.view.notice = None;
    }
}
