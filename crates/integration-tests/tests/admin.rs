//! Administration screens sharing one catalog with the shop screens.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use record_store_client::admin::{GenreListController, GroupAdminController};
use record_store_client::catalog::GroupListController;
use record_store_client::testing::{InMemoryCartService, InMemoryCatalog, genre, group};
use record_store_core::{GenreId, GroupId};
use record_store_integration_tests::{BEATLES, DEADLINE, TestApp};

type Admin = GroupAdminController<Arc<InMemoryCatalog>, Arc<InMemoryCatalog>>;

fn group_admin(catalog: &Arc<InMemoryCatalog>) -> Admin {
    GroupAdminController::new(Arc::clone(catalog), Arc::clone(catalog), DEADLINE)
}

#[tokio::test]
async fn test_new_genre_is_offered_to_group_form() {
    let app = TestApp::start(InMemoryCartService::new());
    let mut genres = GenreListController::new(Arc::clone(&app.catalog), DEADLINE);
    let mut groups = group_admin(&app.catalog);

    genres.set_name("Blues");
    genres.save().await.unwrap();
    let blues = genres.view().genres.iter().find(|g| g.name == "Blues").unwrap().id;

    groups.load_genres().await.unwrap();
    assert!(groups.genres().iter().any(|g| g.id == blues));
    groups.set_name("B.B. King");
    groups.set_genre(Some(blues));
    groups.save().await.unwrap();

    let mut shop = GroupListController::new(Arc::clone(&app.catalog), DEADLINE);
    shop.load_groups().await.unwrap();
    shop.filter_groups("king");
    let listed: Vec<_> = shop
        .view()
        .filtered
        .iter()
        .map(|g| g.genre_name.as_str())
        .collect();
    assert_eq!(listed, ["Blues"]);
}

#[tokio::test]
async fn test_deleted_group_leaves_shop_list() {
    let app = TestApp::start(InMemoryCartService::new());
    let mut groups = group_admin(&app.catalog);
    groups.load_groups().await.unwrap();

    groups.delete_group(BEATLES).await.unwrap();
    assert!(groups.view().groups.is_empty());

    let mut shop = GroupListController::new(Arc::clone(&app.catalog), DEADLINE);
    assert_eq!(shop.load_groups().await.unwrap(), 0);
}

#[tokio::test]
async fn test_group_keeps_genre_after_rename() {
    let catalog = Arc::new(
        InMemoryCatalog::new()
            .with_genre(genre(1, "Rock"))
            .with_group(group(1, "The Beatles", "Rock"), Vec::new()),
    );
    let mut genres = GenreListController::new(Arc::clone(&catalog), DEADLINE);
    genres.load_genres().await.unwrap();
    genres.edit(GenreId::new(1)).unwrap();
    genres.set_name("Rock & Roll");
    genres.save().await.unwrap();

    let mut groups = group_admin(&catalog);
    groups.load_groups().await.unwrap();
    groups.edit(GroupId::new(1)).await.unwrap();
    assert_eq!(groups.form().genre_id, Some(GenreId::new(1)));
}
