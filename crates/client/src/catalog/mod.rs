//! List screens over the catalog.
//!
//! - [`RecordListController`] shows one group's records with live stock and
//!   cart quantities and performs cart mutations
//! - [`GroupListController`] shows the filterable group list

mod groups;
mod records;

pub use groups::{GroupListController, GroupListView};
pub use records::{LoadOutcome, Notice, RecordListController, RecordListView};

/// Image preview toggled by clicking an entry.
///
/// Clicking the entry that is already shown hides the preview; clicking any
/// other entry shows that one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPreview<Id> {
    selected: Option<Id>,
    visible: bool,
    url: Option<String>,
}

impl<Id> Default for PhotoPreview<Id> {
    fn default() -> Self {
        Self {
            selected: None,
            visible: false,
            url: None,
        }
    }
}

impl<Id: Copy + PartialEq> PhotoPreview<Id> {
    pub fn toggle(&mut self, id: Id, url: Option<&str>) {
        if self.visible && self.selected == Some(id) {
            self.visible = false;
        } else {
            self.selected = Some(id);
            self.url = url.map(str::to_string);
            self.visible = true;
        }
    }

    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Entry whose image was last requested.
    #[must_use]
    pub const fn selected(&self) -> Option<Id> {
        self.selected
    }

    /// Image of the selected entry, if it has one and the preview is shown.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|_| self.visible)
    }
}
