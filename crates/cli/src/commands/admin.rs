//! Administration listing commands.

use record_store_client::admin::{GenreListController, UserListController};

use super::{CommandError, Context};

/// Print the genres, optionally filtered by name.
///
/// # Errors
///
/// Returns an error if the genres cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn genres(ctx: &Context, search: Option<&str>) -> Result<(), CommandError> {
    let mut controller = GenreListController::new(ctx.client.clone(), ctx.config.request_timeout);
    controller.load_genres().await?;
    if let Some(search) = search {
        controller.filter_genres(search);
    }

    let view = controller.view();
    println!("{} genres", view.filtered.len());
    for genre in &view.filtered {
        println!("{:>5}  {}", genre.id, genre.name);
    }
    Ok(())
}

/// Print the registered users, optionally filtered by email.
///
/// # Errors
///
/// Returns an error if the users cannot be fetched; a refused session is
/// reported with the administrator login hint.
#[allow(clippy::print_stdout)]
pub async fn users(ctx: &Context, search: Option<&str>) -> Result<(), CommandError> {
    let mut controller = UserListController::new(ctx.client.clone(), ctx.config.request_timeout);
    if let Err(err) = controller.load_users().await {
        if let Some(message) = &controller.view().error {
            tracing::error!("{message}");
        }
        return Err(err.into());
    }
    if let Some(search) = search {
        controller.filter_users(search);
    }

    let view = controller.view();
    println!("{} users", view.filtered.len());
    for user in &view.filtered {
        let role = user.role.map_or_else(|| "-".to_string(), |role| role.to_string());
        println!(
            "{:<40} {:<6} {}",
            user.email.as_str(),
            role,
            user.name.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
