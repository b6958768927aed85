//! Group administration on top of the group list.

use std::time::Duration;

use record_store_core::{Genre, GenreId, Group, GroupDraft, GroupId};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{GroupListController, GroupListView};
use crate::error::AdminError;
use crate::remote::{GenresProvider, GroupsAdmin, within_deadline};

/// Shown when the group list cannot be fetched.
pub const GROUPS_LOAD_FAILED: &str = "Failed to load groups. Please try again.";

/// Group being added (`id` is `None`) or edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupForm {
    pub id: Option<GroupId>,
    pub name: String,
    pub genre_id: Option<GenreId>,
    pub image_url: Option<String>,
    /// File name of the current image.
    pub photo_name: Option<String>,
}

impl GroupForm {
    fn draft(&self) -> GroupDraft {
        GroupDraft {
            name: self.name.trim().to_string(),
            genre_id: self.genre_id,
            image_url: self.image_url.clone(),
        }
    }
}

/// Controller of the group administration screen.
///
/// Listing, filtering and image previews are those of
/// [`GroupListController`]; errors of every operation land in its view.
#[derive(Debug)]
pub struct GroupAdminController<G, N> {
    list: GroupListController<G>,
    genres: N,
    deadline: Duration,
    genre_list: Vec<Genre>,
    genres_loaded: bool,
    form: GroupForm,
}

impl<G: GroupsAdmin, N: GenresProvider> GroupAdminController<G, N> {
    pub fn new(groups: G, genres: N, deadline: Duration) -> Self {
        Self {
            list: GroupListController::new(groups, deadline),
            genres,
            deadline,
            genre_list: Vec::new(),
            genres_loaded: false,
            form: GroupForm::default(),
        }
    }

    #[must_use]
    pub const fn view(&self) -> &GroupListView {
        self.list.view()
    }

    /// Genres offered by the form.
    #[must_use]
    pub fn genres(&self) -> &[Genre] {
        &self.genre_list
    }

    #[must_use]
    pub const fn form(&self) -> &GroupForm {
        &self.form
    }

    #[must_use]
    pub const fn groups_provider(&self) -> &G {
        self.list.provider()
    }

    /// Fetch every group.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the view shows a fixed message.
    pub async fn load_groups(&mut self) -> Result<usize, AdminError> {
        self.list.load_groups().await.map_err(|err| {
            self.list.show_error(GROUPS_LOAD_FAILED.to_string());
            AdminError::from(err)
        })
    }

    /// Fetch the genres offered by the form.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the view shows the server's message or a
    /// generic one.
    #[instrument(skip(self))]
    pub async fn load_genres(&mut self) -> Result<usize, AdminError> {
        match within_deadline("get_genres", self.deadline, self.genres.get_genres()).await {
            Ok(genres) => {
                let count = genres.len();
                self.genre_list = genres;
                self.genres_loaded = true;
                debug!(count, "Genres loaded");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "Failed to load genres");
                Err(self.fail(err.into()))
            }
        }
    }

    pub fn filter_groups(&mut self, search_text: &str) {
        self.list.filter_groups(search_text);
    }

    /// Toggle the image preview of a listed group.
    pub fn show_image(&mut self, group_id: GroupId) -> bool {
        self.list.show_image(group_id)
    }

    /// Put a listed group in the form, loading the genres first if needed.
    ///
    /// The group's genre is matched by id, then by name ignoring case. A genre
    /// matching neither leaves the form without one.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Unknown`] if the group is not listed, or the
    /// transport error of the genre load.
    #[instrument(skip(self))]
    pub async fn edit(&mut self, group_id: GroupId) -> Result<(), AdminError> {
        let listed = self
            .list
            .view()
            .groups
            .iter()
            .find(|group| group.id == group_id)
            .cloned();
        let Some(group) = listed else {
            return Err(self.fail(AdminError::Unknown(format!("Group {group_id}"))));
        };
        if !self.genres_loaded || self.genre_list.is_empty() {
            self.load_genres().await?;
        }

        let genre_id = self.resolve_genre(&group);
        if genre_id.is_none() {
            debug!(genre = %group.genre_name, "Group genre is not listed");
        }
        self.form = GroupForm {
            id: Some(group.id),
            photo_name: group.image_name().map(str::to_string),
            name: group.name,
            genre_id,
            image_url: group.image_url,
        };
        Ok(())
    }

    fn resolve_genre(&self, group: &Group) -> Option<GenreId> {
        group
            .genre_id
            .and_then(|id| self.genre_list.iter().find(|genre| genre.id == id))
            .or_else(|| {
                let name = group.genre_name.trim();
                if name.is_empty() {
                    return None;
                }
                self.genre_list
                    .iter()
                    .find(|genre| genre.name.eq_ignore_ascii_case(name))
            })
            .map(|genre| genre.id)
    }

    pub fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.form.name);
    }

    pub const fn set_genre(&mut self, genre_id: Option<GenreId>) {
        self.form.genre_id = genre_id;
    }

    /// Point the form at another image.
    pub fn set_image(&mut self, image_url: Option<&str>) {
        self.form.image_url = image_url.map(str::to_string);
        self.form.photo_name = image_url
            .and_then(|url| url.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
    }

    pub fn cancel_edit(&mut self) {
        self.form = GroupForm::default();
    }

    /// Add the form's group, or update it when editing, then reload.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Required`] for a blank name or a missing genre,
    /// or the transport error of the write or the reload. A failed write keeps
    /// the form.
    #[instrument(skip(self))]
    pub async fn save(&mut self) -> Result<(), AdminError> {
        let draft = self.form.draft();
        if draft.name.is_empty() {
            return Err(self.fail(AdminError::Required("Name")));
        }
        if draft.genre_id.is_none() {
            return Err(self.fail(AdminError::Required("Genre")));
        }

        let groups = self.list.provider();
        let result = match self.form.id {
            Some(id) => {
                within_deadline("update_group", self.deadline, groups.update_group(id, &draft))
                    .await
            }
            None => within_deadline("add_group", self.deadline, groups.add_group(&draft)).await,
        };
        if let Err(err) = result {
            warn!(error = %err, "Failed to save group");
            return Err(self.fail(err.into()));
        }

        info!(name = %draft.name, "Group saved");
        self.cancel_edit();
        self.load_groups().await.map(|_| ())
    }

    /// Delete a group, then reload.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the delete or the reload.
    #[instrument(skip(self))]
    pub async fn delete_group(&mut self, group_id: GroupId) -> Result<(), AdminError> {
        let groups = self.list.provider();
        let result =
            within_deadline("delete_group", self.deadline, groups.delete_group(group_id)).await;
        if let Err(err) = result {
            warn!(error = %err, "Failed to delete group");
            return Err(self.fail(err.into()));
        }

        info!("Group deleted");
        self.cancel_edit();
        self.load_groups().await.map(|_| ())
    }

    fn fail(&mut self, err: AdminError) -> AdminError {
        self.list.show_error(err.user_message());
        err
    }
}
