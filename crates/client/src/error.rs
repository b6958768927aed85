//! Error types shared by the cart store, controllers and REST client.
//!
//! Remote failures are [`TransportError`]s. Preconditions checked before any
//! remote call are [`ValidationError`]s. Cart operations return [`CartError`],
//! which wraps either; administration forms return [`AdminError`].
//!
//! View-facing strings come from [`CartError::user_message`] and
//! [`TransportError::user_message`]; transport internals never reach a view.

use std::time::Duration;

use record_store_core::RecordId;
use thiserror::Error;

/// Shown when a failed call carries no message from the server.
pub const UNEXPECTED_ERROR: &str = "An unexpected error has occurred";

/// A remote call failed or did not answer in time.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("(no message)"))]
    Status {
        status: u16,
        /// Message extracted from the response body, if any.
        message: Option<String>,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    InvalidUrl(String),

    /// No response within the configured deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The remote service could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Message supplied by the server, suitable for display.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }

    /// HTTP status of a non-success answer.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message for the view: the server's message when it sent one,
    /// otherwise `fallback`.
    #[must_use]
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }
}

/// A precondition failed; nothing was sent to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record {0} is out of stock")]
    OutOfStock(RecordId),

    #[error("cart is disabled for this session")]
    CartDisabled,

    #[error("no active session")]
    NoSession,

    #[error("record {0} is not in the cart")]
    NotInCart(RecordId),

    #[error("a cart operation for record {0} is already in flight")]
    InFlight(RecordId),

    #[error("record {0} is not in the current list")]
    UnknownRecord(RecordId),
}

/// Failure of a cart operation.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CartError {
    /// Whether the failure came from the remote side (and was rolled back).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Message for the view: the server's message when it sent one,
    /// otherwise `fallback`. Validation errors describe themselves.
    #[must_use]
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Transport(err) => err.user_message(fallback),
            Self::Validation(err) => err.to_string(),
        }
    }
}

/// Failure of an administration form.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A required form field is blank; nothing was sent.
    #[error("{0} is required")]
    Required(&'static str),

    /// The entry is not in the current list.
    #[error("{0} is not in the current list")]
    Unknown(String),
}

impl AdminError {
    /// Message for the view. Transport failures show the server's message or
    /// the generic one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(err) => err.user_message(UNEXPECTED_ERROR),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_transport_details() {
        let err = CartError::from(TransportError::Unavailable("connection refused".to_string()));
        assert_eq!(err.user_message("Error adding to cart"), "Error adding to cart");
        assert!(err.is_transport());
    }

    #[test]
    fn test_user_message_prefers_server_message() {
        let err = CartError::from(TransportError::Status {
            status: 409,
            message: Some("Only 2 left".to_string()),
        });
        assert_eq!(err.user_message("Error adding to cart"), "Only 2 left");
    }

    #[test]
    fn test_blank_server_message_is_ignored() {
        let err = TransportError::Status {
            status: 500,
            message: Some("  ".to_string()),
        };
        assert_eq!(err.server_message(), None);
    }

    #[test]
    fn test_admin_message_falls_back_to_generic_text() {
        let err = AdminError::from(TransportError::Status {
            status: 500,
            message: None,
        });
        assert_eq!(err.user_message(), "An unexpected error has occurred");
        assert_eq!(AdminError::Required("Name").user_message(), "Name is required");
        assert_eq!(
            TransportError::Status {
                status: 401,
                message: None
            }
            .status(),
            Some(401)
        );
    }

    #[test]
    fn test_validation_display() {
        let err = CartError::from(ValidationError::OutOfStock(RecordId::new(3)));
        assert_eq!(err.to_string(), "Validation error: record 3 is out of stock");
        assert!(!err.is_transport());
    }
}
