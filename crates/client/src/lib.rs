//! Record Store client library.
//!
//! Owns the session's cart, keeps per-record stock in sync across every view
//! and drives the record and group list screens and the administration
//! screens for genres, groups and users.
//!
//! # Architecture
//!
//! - [`stock::StockChannel`] broadcasts stock changes to any number of views
//! - [`cart::CartStore`] is the only writer of the cart; everyone else reads
//!   `Arc` snapshots or `tokio::sync::watch` streams
//! - [`catalog`] holds the record and group list controllers
//! - [`admin`] holds the genre, group and user administration controllers
//! - [`session::SessionBridge`] follows the signed-in user and opens or resets
//!   the cart session
//! - [`api::RestClient`] implements the remote collaborators over HTTP
//!
//! Collaborators are traits in [`remote`], so every component can be driven by
//! in-memory fakes in tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod admin;
pub mod api;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod remote;
pub mod session;
pub mod stock;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
