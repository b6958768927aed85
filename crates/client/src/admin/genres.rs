//! Genre list and form.

use std::time::Duration;

use record_store_core::{Genre, GenreId};
use tracing::{debug, info, instrument, warn};

use crate::error::AdminError;
use crate::remote::{GenresProvider, within_deadline};

/// Genre being added (`id` is `None`) or renamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreForm {
    pub id: Option<GenreId>,
    pub name: String,
}

/// Render state of the genre screen.
#[derive(Debug, Clone, Default)]
pub struct GenreListView {
    pub genres: Vec<Genre>,
    pub filtered: Vec<Genre>,
    pub search_text: String,
    pub loading: bool,
    pub error: Option<String>,
    pub form: GenreForm,
}

impl GenreListView {
    fn refilter(&mut self) {
        let needle = self.search_text.trim().to_lowercase();
        self.filtered = self
            .genres
            .iter()
            .filter(|genre| genre.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
    }

    fn fail(&mut self, err: AdminError) -> AdminError {
        self.error = Some(err.user_message());
        err
    }
}

/// Controller of the genre administration screen.
#[derive(Debug)]
pub struct GenreListController<N> {
    genres: N,
    deadline: Duration,
    view: GenreListView,
}

impl<N: GenresProvider> GenreListController<N> {
    pub fn new(genres: N, deadline: Duration) -> Self {
        Self {
            genres,
            deadline,
            view: GenreListView::default(),
        }
    }

    #[must_use]
    pub const fn view(&self) -> &GenreListView {
        &self.view
    }

    #[must_use]
    pub const fn provider(&self) -> &N {
        &self.genres
    }

    /// Fetch every genre and apply the current filter.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the previous list stays on screen.
    #[instrument(skip(self))]
    pub async fn load_genres(&mut self) -> Result<usize, AdminError> {
        self.view.loading = true;
        self.view.error = None;

        let result = within_deadline("get_genres", self.deadline, self.genres.get_genres()).await;
        self.view.loading = false;

        match result {
            Ok(genres) => {
                let count = genres.len();
                self.view.genres = genres;
                self.view.refilter();
                debug!(count, "Genres loaded");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "Failed to load genres");
                Err(self.view.fail(err.into()))
            }
        }
    }

    pub fn filter_genres(&mut self, search_text: &str) {
        search_text.clone_into(&mut self.view.search_text);
        self.view.refilter();
    }

    /// Put a listed genre in the form for renaming.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Unknown`] if the genre is not listed.
    pub fn edit(&mut self, genre_id: GenreId) -> Result<(), AdminError> {
        let listed = self.view.genres.iter().find(|genre| genre.id == genre_id).cloned();
        let Some(genre) = listed else {
            return Err(self.view.fail(AdminError::Unknown(format!("Genre {genre_id}"))));
        };
        self.view.form = GenreForm {
            id: Some(genre.id),
            name: genre.name,
        };
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.view.form.name);
    }

    pub fn cancel_edit(&mut self) {
        self.view.form = GenreForm::default();
    }

    /// Add the form's genre, or rename it when editing, then reload.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Required`] for a blank name, or the transport
    /// error of the write or the reload. A failed write keeps the form.
    #[instrument(skip(self))]
    pub async fn save(&mut self) -> Result<(), AdminError> {
        self.view.error = None;
        let name = self.view.form.name.trim().to_string();
        if name.is_empty() {
            return Err(self.view.fail(AdminError::Required("Name")));
        }

        let result = match self.view.form.id {
            Some(id) => {
                let genre = Genre { id, name };
                within_deadline("update_genre", self.deadline, self.genres.update_genre(&genre))
                    .await
            }
            None => within_deadline("add_genre", self.deadline, self.genres.add_genre(&name)).await,
        };
        if let Err(err) = result {
            warn!(error = %err, "Failed to save genre");
            return Err(self.view.fail(err.into()));
        }

        info!("Genre saved");
        self.cancel_edit();
        self.load_genres().await.map(|_| ())
    }

    /// Delete a genre, then reload.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the delete or the reload.
    #[instrument(skip(self))]
    pub async fn delete_genre(&mut self, genre_id: GenreId) -> Result<(), AdminError> {
        self.view.error = None;
        let result =
            within_deadline("delete_genre", self.deadline, self.genres.delete_genre(genre_id))
                .await;
        if let Err(err) = result {
            warn!(error = %err, "Failed to delete genre");
            return Err(self.view.fail(err.into()));
        }

        info!("Genre deleted");
        self.cancel_edit();
        self.load_genres().await.map(|_| ())
    }
}
