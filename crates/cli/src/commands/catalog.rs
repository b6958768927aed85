//! Catalog listing commands.

use record_store_client::catalog::{GroupListController, LoadOutcome, Notice, RecordListController};
use record_store_core::GroupId;
use tracing::warn;

use super::{CommandError, Context, format_record};

/// Print the groups, optionally filtered by name.
///
/// # Errors
///
/// Returns an error if the groups cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn groups(ctx: &Context, search: Option<&str>) -> Result<(), CommandError> {
    let mut controller = GroupListController::new(ctx.client.clone(), ctx.config.request_timeout);
    controller.load_groups().await?;
    if let Some(search) = search {
        controller.filter_groups(search);
    }

    let view = controller.view();
    println!("{} groups", view.filtered.len());
    for group in &view.filtered {
        println!("{:>5}  {:<40} {}", group.id, group.name, group.genre_name);
    }
    Ok(())
}

/// Print the records of a group, optionally filtered.
///
/// # Errors
///
/// Returns an error if the records cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn records(ctx: &Context, group: GroupId, search: Option<&str>) -> Result<(), CommandError> {
    let controller = RecordListController::open(ctx.client.clone(), ctx.cart_store());
    if controller.load_records(group).await? == LoadOutcome::Empty {
        println!("{}", Notice::NoRecords.message());
        return Ok(());
    }
    if let Some(search) = search {
        controller.filter_records(search);
    }

    let view = controller.view();
    if let Some(error) = &view.error {
        warn!(%error, "Group loaded partially");
    }
    println!("{} ({} records)", view.group_name, view.filtered.len());
    for record in view.filtered.iter() {
        println!("{}", format_record(record));
    }
    Ok(())
}
