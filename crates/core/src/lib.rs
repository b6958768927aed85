//! Record Store Core - Shared catalog and cart types.
//!
//! This crate provides the types shared by every record store component:
//! - `client` - Cart store, stock channel, catalog controllers and REST client
//! - `cli` - Command-line front end for browsing records and editing the cart
//!
//! # Architecture
//!
//! The core crate contains only types and pure computations - no I/O, no
//! HTTP clients, no async runtime. Cart totals are derived here so that every
//! consumer recomputes them the same way.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, prices, catalog entries, users, cart
//!   state and stock events

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
