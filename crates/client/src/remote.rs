//! Remote collaborators consumed by the cart store and the controllers.
//!
//! Implementations normalize whatever shape the server sends into these typed
//! results; nothing past this boundary inspects raw payloads.
//!
//! Methods return `impl Future + Send` so generic stores can be driven from
//! spawned Tokio tasks. Every trait is also implemented for `Arc<T>`, so one
//! provider can back several controllers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use record_store_core::{
    CartLine, CartMutation, CartStatus, Email, Genre, GenreId, Group, GroupDraft, GroupId, Record,
    User,
};
use tracing::warn;

use crate::error::TransportError;

/// Await `call`, failing with [`TransportError::Timeout`] once `deadline` passes.
pub(crate) async fn within_deadline<T>(
    operation: &'static str,
    deadline: Duration,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(deadline, call).await.unwrap_or_else(|_| {
        warn!(operation, ?deadline, "Remote call exceeded deadline");
        Err(TransportError::Timeout {
            operation,
            after: deadline,
        })
    })
}

/// Source of catalog records.
pub trait RecordsProvider: Send + Sync {
    /// Records published by a group.
    fn get_records_by_group(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<Vec<Record>, TransportError>> + Send;

    /// Display name of a group.
    fn get_group_name(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Source of the group list.
pub trait GroupsProvider: Send + Sync {
    fn get_groups(&self) -> impl Future<Output = Result<Vec<Group>, TransportError>> + Send;
}

/// Group administration.
pub trait GroupsAdmin: GroupsProvider {
    fn add_group(&self, draft: &GroupDraft)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    fn update_group(
        &self,
        group_id: GroupId,
        draft: &GroupDraft,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn delete_group(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Genre list and administration.
pub trait GenresProvider: Send + Sync {
    fn get_genres(&self) -> impl Future<Output = Result<Vec<Genre>, TransportError>> + Send;

    fn add_genre(&self, name: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Rename `genre.id` to `genre.name`.
    fn update_genre(&self, genre: &Genre)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    fn delete_genre(
        &self,
        genre_id: GenreId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Registered users, visible to administrators.
pub trait UsersProvider: Send + Sync {
    fn get_users(&self) -> impl Future<Output = Result<Vec<User>, TransportError>> + Send;

    fn delete_user(&self, email: &Email)
    -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Remote cart service, addressed by the session email.
pub trait CartService: Send + Sync {
    /// The authoritative cart lines of the session.
    fn get_cart_items(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<Vec<CartLine>, TransportError>> + Send;

    /// Add one unit of `record`.
    fn add_to_cart(
        &self,
        email: &Email,
        record: &Record,
    ) -> impl Future<Output = Result<CartMutation, TransportError>> + Send;

    /// Remove one unit of `record`.
    fn remove_from_cart(
        &self,
        email: &Email,
        record: &Record,
    ) -> impl Future<Output = Result<CartMutation, TransportError>> + Send;

    /// Whether the cart is enabled for the session.
    fn get_cart_status(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<CartStatus, TransportError>> + Send;
}

impl<T: RecordsProvider> RecordsProvider for Arc<T> {
    fn get_records_by_group(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<Vec<Record>, TransportError>> + Send {
        (**self).get_records_by_group(group_id)
    }

    fn get_group_name(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<String, TransportError>> + Send {
        (**self).get_group_name(group_id)
    }
}

impl<T: GroupsProvider> GroupsProvider for Arc<T> {
    fn get_groups(&self) -> impl Future<Output = Result<Vec<Group>, TransportError>> + Send {
        (**self).get_groups()
    }
}

impl<T: GroupsAdmin> GroupsAdmin for Arc<T> {
    fn add_group(
        &self,
        draft: &GroupDraft,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).add_group(draft)
    }

    fn update_group(
        &self,
        group_id: GroupId,
        draft: &GroupDraft,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).update_group(group_id, draft)
    }

    fn delete_group(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).delete_group(group_id)
    }
}

impl<T: GenresProvider> GenresProvider for Arc<T> {
    fn get_genres(&self) -> impl Future<Output = Result<Vec<Genre>, TransportError>> + Send {
        (**self).get_genres()
    }

    fn add_genre(&self, name: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).add_genre(name)
    }

    fn update_genre(
        &self,
        genre: &Genre,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).update_genre(genre)
    }

    fn delete_genre(
        &self,
        genre_id: GenreId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).delete_genre(genre_id)
    }
}

impl<T: UsersProvider> UsersProvider for Arc<T> {
    fn get_users(&self) -> impl Future<Output = Result<Vec<User>, TransportError>> + Send {
        (**self).get_users()
    }

    fn delete_user(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).delete_user(email)
    }
}

impl<T: CartService> CartService for Arc<T> {
    fn get_cart_items(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<Vec<CartLine>, TransportError>> + Send {
        (**self).get_cart_items(email)
    }

    fn add_to_cart(
        &self,
        email: &Email,
        record: &Record,
    ) -> impl Future<Output = Result<CartMutation, TransportError>> + Send {
        (**self).add_to_cart(email, record)
    }

    fn remove_from_cart(
        &self,
        email: &Email,
        record: &Record,
    ) -> impl Future<Output = Result<CartMutation, TransportError>> + Send {
        (**self).remove_from_cart(email, record)
    }

    fn get_cart_status(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<CartStatus, TransportError>> + Send {
        (**self).get_cart_status(email)
    }
}
