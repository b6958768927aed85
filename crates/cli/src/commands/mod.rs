//! Subcommand implementations.

pub mod admin;
pub mod cart;
pub mod catalog;

use std::fmt::Write;
use std::sync::Arc;

use record_store_client::api::RestClient;
use record_store_client::cart::CartStore;
use record_store_client::config::{ClientConfig, ConfigError};
use record_store_client::error::{AdminError, CartError, TransportError};
use record_store_client::stock::StockChannel;
use record_store_core::Record;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Cart(#[from] CartError),

    #[error("{0}")]
    Admin(#[from] AdminError),

    /// The cart is switched off for this user.
    #[error("Cart is disabled for {0}")]
    CartDisabled(String),
}

/// Configuration and API client shared by all commands.
pub struct Context {
    pub config: ClientConfig,
    pub client: RestClient,
}

impl Context {
    /// Load configuration from the environment and build the API client.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is missing or invalid.
    pub fn from_env() -> Result<Self, CommandError> {
        let config = ClientConfig::from_env()?;
        let client = RestClient::new(&config)?;
        tracing::debug!(api_url = %config.api_url, "Using record store API");
        Ok(Self { config, client })
    }

    /// A fresh cart store over the API client.
    pub fn cart_store(&self) -> Arc<CartStore<RestClient>> {
        Arc::new(CartStore::new(
            self.client.clone(),
            StockChannel::new(),
            self.config.request_timeout,
        ))
    }
}

/// One line of record output.
pub fn format_record(record: &Record) -> String {
    let year = record
        .year_of_publication
        .map_or_else(|| "----".to_string(), |year| year.to_string());
    let mut line = format!(
        "{:>5}  {:<40} {year}  {:>9}  stock {:>3}",
        record.id,
        record.title,
        record.price.to_string(),
        record.stock
    );
    if record.in_cart() {
        let _ = write!(line, "  in cart {}", record.quantity_in_cart);
    }
    if record.discontinued {
        line.push_str("  (discontinued)");
    }
    line
}
