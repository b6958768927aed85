//! Registered users as listed by the administration.

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::session::Role;

/// A registered user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: Email,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl User {
    /// Case-insensitive match of `needle` against the email.
    ///
    /// `needle` must already be lowercased. An empty needle matches everything.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        self.email.as_str().contains(needle)
    }
}
