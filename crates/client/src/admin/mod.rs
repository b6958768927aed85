//! Administration screens for the catalog and the user accounts.
//!
//! - [`GenreListController`] lists, filters, adds, renames and deletes genres
//! - [`GroupAdminController`] edits groups on top of the group list
//! - [`UserListController`] lists and deletes registered users
//!
//! Each write reloads its list on success. Failures keep the form as typed and
//! show the server's message, or a generic one when it sent none.

mod genres;
mod groups;
mod users;

pub use genres::{GenreForm, GenreListController, GenreListView};
pub use groups::{GROUPS_LOAD_FAILED, GroupAdminController, GroupForm};
pub use users::{USERS_FORBIDDEN, USERS_LOAD_FAILED, UserListController, UserListView, UserNotice};
