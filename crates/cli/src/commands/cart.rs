//! Cart commands.

use std::sync::Arc;

use record_store_client::api::RestClient;
use record_store_client::cart::CartStore;
use record_store_client::catalog::RecordListController;
use record_store_core::{Email, GroupId, RecordId};
use tracing::info;

use super::{CommandError, Context};

#[derive(Debug, Clone, Copy)]
enum Change {
    Add,
    Remove,
}

#[allow(clippy::print_stdout)]
fn print_cart(store: &CartStore<RestClient>) {
    let cart = store.snapshot();
    if !cart.is_enabled() {
        println!("Cart is disabled");
        return;
    }
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }
    for line in cart.lines() {
        println!(
            "{:>5}  x{:<3} {:>9}  {:>9}",
            line.record_id,
            line.quantity,
            line.unit_price.to_string(),
            line.subtotal().to_string()
        );
    }
    println!("{} items, total {}", cart.item_count(), cart.total());
}

/// Print a user's cart.
///
/// # Errors
///
/// Returns an error if the cart cannot be fetched.
pub async fn show(ctx: &Context, email: &Email) -> Result<(), CommandError> {
    let store = ctx.cart_store();
    store.establish_session(email).await?;
    print_cart(&store);
    Ok(())
}

/// Add one unit of `record` from `group` to a user's cart.
///
/// # Errors
///
/// Returns an error if the cart is disabled, the record is not listed in the
/// group or the change is rejected.
pub async fn add(
    ctx: &Context,
    email: &Email,
    group: GroupId,
    record: RecordId,
) -> Result<(), CommandError> {
    change(ctx, email, group, record, Change::Add).await
}

/// Remove one unit of `record` from a user's cart.
///
/// # Errors
///
/// Same as [`add`].
pub async fn remove(
    ctx: &Context,
    email: &Email,
    group: GroupId,
    record: RecordId,
) -> Result<(), CommandError> {
    change(ctx, email, group, record, Change::Remove).await
}

#[allow(clippy::print_stdout)]
async fn change(
    ctx: &Context,
    email: &Email,
    group: GroupId,
    record: RecordId,
    change: Change,
) -> Result<(), CommandError> {
    let store = ctx.cart_store();
    if !store.establish_session(email).await?.is_enabled() {
        return Err(CommandError::CartDisabled(email.to_string()));
    }

    let controller = RecordListController::open(ctx.client.clone(), Arc::clone(&store));
    controller.load_records(group).await?;
    let outcome = match change {
        Change::Add => controller.add_to_cart(record).await?,
        Change::Remove => controller.remove_record(record).await?,
    };
    info!(?change, record_id = %outcome.record_id, quantity = outcome.quantity, stock = outcome.stock, "Cart updated");

    println!(
        "Record {}: {} in cart, {} in stock",
        outcome.record_id, outcome.quantity, outcome.stock
    );
    print_cart(&store);
    Ok(())
}
