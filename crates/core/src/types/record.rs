//! Catalog entries: purchasable records, the groups that publish them and
//! the genres groups belong to.

use serde::{Deserialize, Serialize};

use super::id::{GenreId, GroupId, RecordId};
use super::price::Price;

/// A purchasable record in the catalog.
///
/// `stock` is the last-known available stock and `quantity_in_cart` the number
/// of units in the viewing session's cart. Both are non-negative by type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub title: String,
    pub year_of_publication: Option<i32>,
    pub price: Price,
    pub stock: u32,
    #[serde(default)]
    pub quantity_in_cart: u32,
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub discontinued: bool,
}

impl Record {
    /// Whether the record is currently part of the session's cart.
    #[must_use]
    pub const fn in_cart(&self) -> bool {
        self.quantity_in_cart > 0
    }

    /// Case-insensitive match of `needle` against title, group name and year.
    ///
    /// `needle` must already be lowercased. An empty needle matches everything.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle)
            || self.group_name.to_lowercase().contains(needle)
            || self
                .year_of_publication
                .is_some_and(|year| year.to_string().contains(needle))
    }
}

/// A music group with its genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub genre_id: Option<GenreId>,
    #[serde(default)]
    pub genre_name: String,
}

impl Group {
    /// File name of the group's image, the last path segment of its URL.
    #[must_use]
    pub fn image_name(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .and_then(|url| url.rsplit('/').next())
            .filter(|name| !name.is_empty())
    }
}

/// Fields of a group as submitted by the catalog administration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDraft {
    pub name: String,
    pub genre_id: Option<GenreId>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A music genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}
