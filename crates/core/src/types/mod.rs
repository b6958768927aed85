//! Core types for the record store.
//!
//! This module provides type-safe wrappers for catalog and cart concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod record;
pub mod session;
pub mod stock;
pub mod user;

pub use cart::{CartLine, CartMutation, CartState, CartStatus};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use record::{Genre, Group, GroupDraft, Record};
pub use session::Role;
pub use stock::StockEvent;
pub use user::User;
