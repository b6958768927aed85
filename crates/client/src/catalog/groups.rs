//! Group list.

use std::time::Duration;

use record_store_core::{Group, GroupId};
use tracing::{debug, instrument, warn};

use super::PhotoPreview;
use crate::error::{TransportError, UNEXPECTED_ERROR};
use crate::remote::{GroupsProvider, within_deadline};

/// Render state of the group list.
#[derive(Debug, Clone, Default)]
pub struct GroupListView {
    pub groups: Vec<Group>,
    pub filtered: Vec<Group>,
    pub search_text: String,
    pub loading: bool,
    pub error: Option<String>,
    pub photo: PhotoPreview<GroupId>,
}

impl GroupListView {
    fn refilter(&mut self) {
        let needle = self.search_text.trim().to_lowercase();
        self.filtered = self
            .groups
            .iter()
            .filter(|group| group.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
    }
}

/// Controller of the group list screen.
#[derive(Debug)]
pub struct GroupListController<G> {
    groups: G,
    deadline: Duration,
    view: GroupListView,
}

impl<G: GroupsProvider> GroupListController<G> {
    pub fn new(groups: G, deadline: Duration) -> Self {
        Self {
            groups,
            deadline,
            view: GroupListView::default(),
        }
    }

    #[must_use]
    pub const fn view(&self) -> &GroupListView {
        &self.view
    }

    #[must_use]
    pub const fn provider(&self) -> &G {
        &self.groups
    }

    /// Fetch every group and apply the current filter.
    ///
    /// # Errors
    ///
    /// Returns the transport error. The lists are cleared and the view shows
    /// the server's message, or a generic one when it sent none.
    #[instrument(skip(self))]
    pub async fn load_groups(&mut self) -> Result<usize, TransportError> {
        self.view.loading = true;
        self.view.error = None;

        let result = within_deadline("get_groups", self.deadline, self.groups.get_groups()).await;
        self.view.loading = false;

        match result {
            Ok(groups) => {
                let count = groups.len();
                self.view.groups = groups;
                self.view.refilter();
                debug!(count, "Groups loaded");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "Failed to load groups");
                self.view.groups.clear();
                self.view.filtered.clear();
                self.view.error = Some(err.user_message(UNEXPECTED_ERROR));
                Err(err)
            }
        }
    }

    pub(crate) fn show_error(&mut self, message: String) {
        self.view.error = Some(message);
    }

    /// Case-insensitive match on the group name.
    pub fn filter_groups(&mut self, search_text: &str) {
        search_text.clone_into(&mut self.view.search_text);
        self.view.refilter();
    }

    /// Toggle the image preview of a listed group.
    ///
    /// Returns `false` if the group is not listed.
    pub fn show_image(&mut self, group_id: GroupId) -> bool {
        let Some(url) = self
            .view
            .groups
            .iter()
            .find(|group| group.id == group_id)
            .map(|group| group.image_url.clone())
        else {
            return false;
        };
        self.view.photo.toggle(group_id, url.as_deref());
        true
    }
}
