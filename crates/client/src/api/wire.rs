//! Wire shapes of the REST API and their conversion to core types.
//!
//! List endpoints answer in several shapes depending on the server's
//! serializer settings; [`ListPayload`] accepts all of them.

use std::collections::BTreeMap;

use record_store_core::{
    CartLine, CartMutation, Email, Genre, GenreId, Group, GroupDraft, GroupId, Price, Record,
    RecordId, Role, User,
};
use serde::{Deserialize, Serialize};

/// A list in any of the shapes the server emits.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    /// `[...]`
    Array(Vec<T>),
    /// `{"$values": [...]}` (reference-preserving serializer)
    Values {
        #[serde(rename = "$values")]
        values: Vec<T>,
    },
    /// `{"data": [...]}`
    Data { data: Vec<T> },
    /// `{"0": {...}, "1": {...}}`
    Keyed(BTreeMap<String, T>),
}

impl<T> ListPayload<T> {
    /// Flatten into a list. Keyed entries come back in numeric key order.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Array(items) | Self::Values { values: items } | Self::Data { data: items } => {
                items
            }
            Self::Keyed(map) => {
                let mut entries: Vec<_> = map.into_iter().collect();
                entries.sort_by(|(a, _), (b, _)| {
                    (a.parse::<u64>().ok(), a.as_str()).cmp(&(b.parse::<u64>().ok(), b.as_str()))
                });
                entries.into_iter().map(|(_, item)| item).collect()
            }
        }
    }
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDto {
    pub id_record: i32,
    #[serde(default)]
    pub title_record: String,
    #[serde(default)]
    pub year_of_publication: Option<i32>,
    #[serde(default)]
    pub image_record: Option<String>,
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub discontinued: bool,
    #[serde(default)]
    pub group_id: Option<i32>,
    #[serde(default, alias = "nameGroup")]
    pub group_name: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

impl From<RecordDto> for Record {
    fn from(dto: RecordDto) -> Self {
        Self {
            id: RecordId::new(dto.id_record),
            title: dto.title_record,
            year_of_publication: dto.year_of_publication,
            price: dto.price,
            stock: clamp_count(dto.stock),
            quantity_in_cart: dto.amount.map_or(0, clamp_count),
            group_id: dto.group_id.map(GroupId::new),
            group_name: dto.group_name.unwrap_or_default(),
            image_url: dto.image_record.filter(|url| !url.trim().is_empty()),
            discontinued: dto.discontinued,
        }
    }
}

impl RecordDto {
    /// The cart line this entry describes, if it holds any units.
    pub fn into_cart_line(self) -> Option<CartLine> {
        let quantity = self.amount.map_or(0, clamp_count);
        (quantity > 0).then(|| CartLine::new(RecordId::new(self.id_record), quantity, self.price))
    }
}

/// Answer to an add or remove: the updated record, possibly partial.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationDto {
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub amount: Option<i64>,
}

impl MutationDto {
    pub fn into_mutation(self, record_id: RecordId) -> CartMutation {
        CartMutation {
            record_id,
            stock: self.stock.map(clamp_count),
            quantity: self.amount.map(clamp_count),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemBody {
    pub record_id: i32,
    pub amount: u32,
}

#[derive(Debug, Deserialize)]
pub struct CartStatusDto {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDto {
    pub id_group: i32,
    #[serde(default)]
    pub name_group: String,
    #[serde(default)]
    pub image_group: Option<String>,
    #[serde(default)]
    pub music_genre_id: Option<i32>,
    #[serde(default)]
    pub music_genre_name: String,
}

impl From<GroupDto> for Group {
    fn from(dto: GroupDto) -> Self {
        Self {
            id: GroupId::new(dto.id_group),
            name: dto.name_group,
            image_url: dto.image_group.filter(|url| !url.trim().is_empty()),
            genre_id: dto.music_genre_id.map(GenreId::new),
            genre_name: dto.music_genre_name,
        }
    }
}

/// Body of a group create or update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_group: Option<i32>,
    pub name_group: &'a str,
    pub music_genre_id: Option<i32>,
    pub image_group: Option<&'a str>,
}

impl<'a> GroupBody<'a> {
    pub fn new(id: Option<GroupId>, draft: &'a GroupDraft) -> Self {
        Self {
            id_group: id.map(|id| id.as_i32()),
            name_group: &draft.name,
            music_genre_id: draft.genre_id.map(|id| id.as_i32()),
            image_group: draft.image_url.as_deref(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_music_genre: Option<i32>,
    #[serde(default)]
    pub name_music_genre: String,
}

impl GenreDto {
    /// The genre this entry describes; entries without an id are dropped.
    pub fn into_genre(self) -> Option<Genre> {
        Some(Genre {
            id: GenreId::new(self.id_music_genre?),
            name: self.name_music_genre,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub email: String,
    #[serde(default, alias = "userName")]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl UserDto {
    /// The user this entry describes; entries with an invalid email are
    /// dropped and unknown roles are left unset.
    pub fn into_user(self) -> Option<User> {
        let email = Email::parse(&self.email).ok()?;
        Some(User {
            email,
            name: self.name.filter(|name| !name.trim().is_empty()),
            role: self.role.and_then(|role| role.parse::<Role>().ok()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupNamePayload {
    Plain(String),
    Object {
        #[serde(rename = "nameGroup", alias = "name")]
        name_group: String,
    },
}

/// Group name from a JSON string, a `{"nameGroup": ...}` object or raw text.
pub fn parse_group_name(body: &str) -> String {
    match serde_json::from_str::<GroupNamePayload>(body) {
        Ok(GroupNamePayload::Plain(name) | GroupNamePayload::Object { name_group: name }) => name,
        Err(_) => body.trim().to_string(),
    }
}

/// Error body fields that may carry a displayable message, in order of
/// preference. Non-string values are ignored.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    title: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        [self.message, self.detail, self.title, self.error]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                serde_json::Value::String(text) if !text.trim().is_empty() => Some(text),
                _ => None,
            })
    }
}

const MAX_PLAIN_ERROR_LEN: usize = 200;

/// Displayable message from an error response body.
///
/// Takes the first of `message`, `detail`, `title` or `error` from a JSON
/// object, or a short plain-text body as is.
pub fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(error) = serde_json::from_str::<ErrorBody>(body) {
        return error.into_message();
    }
    let looks_like_markup = body.starts_with('<') || body.starts_with('{');
    (!looks_like_markup && body.len() <= MAX_PLAIN_ERROR_LEN).then(|| body.to_string())
}
