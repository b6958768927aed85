//! Record Store CLI - browse the catalog and manage a cart from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # List groups, optionally filtered by name
//! rs-cli groups --search beat
//!
//! # List genres and registered users (administrators)
//! rs-cli genres --search rock
//! rs-cli users --search example.com
//!
//! # List the records of group 1
//! rs-cli records 1 --search "abbey"
//!
//! # Show the cart of a user
//! rs-cli cart -e shopper@example.com
//!
//! # Add or remove one unit of record 4 from group 1
//! rs-cli add -e shopper@example.com 1 4
//! rs-cli remove -e shopper@example.com 1 4
//! ```
//!
//! Configuration comes from `RECORD_STORE_*` environment variables (see
//! `record_store_client::config`). Log verbosity follows `RUST_LOG`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use record_store_core::{Email, GroupId, RecordId};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "rs-cli")]
#[command(author, version, about = "Record Store CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the groups in the catalog
    Groups {
        /// Case-insensitive filter on the group name
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List the music genres
    Genres {
        /// Case-insensitive filter on the genre name
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List the registered users
    Users {
        /// Case-insensitive filter on the email
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List the records of a group
    Records {
        group: GroupId,

        /// Case-insensitive filter on title, group name or year
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show a user's cart
    Cart {
        #[arg(short, long)]
        email: Email,
    },
    /// Add one unit of a record to a user's cart
    Add {
        #[arg(short, long)]
        email: Email,
        group: GroupId,
        record: RecordId,
    },
    /// Remove one unit of a record from a user's cart
    Remove {
        #[arg(short, long)]
        email: Email,
        group: GroupId,
        record: RecordId,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("record_store_client=info")),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = commands::Context::from_env()?;
    match cli.command {
        Commands::Groups { search } => commands::catalog::groups(&ctx, search.as_deref()).await?,
        Commands::Genres { search } => commands::admin::genres(&ctx, search.as_deref()).await?,
        Commands::Users { search } => commands::admin::users(&ctx, search.as_deref()).await?,
        Commands::Records { group, search } => {
            commands::catalog::records(&ctx, group, search.as_deref()).await?;
        }
        Commands::Cart { email } => commands::cart::show(&ctx, &email).await?,
        Commands::Add {
            email,
            group,
            record,
        } => commands::cart::add(&ctx, &email, group, record).await?,
        Commands::Remove {
            email,
            group,
            record,
        } => commands::cart::remove(&ctx, &email, group, record).await?,
    }
    Ok(())
}
