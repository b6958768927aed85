//! REST implementation of the remote collaborators.
//!
//! Uses `reqwest` 0.13 for HTTP. Group names are cached using `moka` with the
//! configured TTL; records and carts are never cached.
//!
//! # Endpoints
//!
//! All paths are relative to `RECORD_STORE_API_URL`:
//!
//! | Operation | Request |
//! |---|---|
//! | records of a group | `GET records/group/{group_id}` |
//! | group name | `GET groups/{group_id}/name` |
//! | group list | `GET groups` |
//! | add group | `POST groups` `{"nameGroup", "musicGenreId", "imageGroup"}` |
//! | update group | `PUT groups/{group_id}` (same body plus `idGroup`) |
//! | delete group | `DELETE groups/{group_id}` |
//! | genre list | `GET genres` |
//! | add genre | `POST genres` `{"nameMusicGenre"}` |
//! | rename genre | `PUT genres/{genre_id}` `{"idMusicGenre", "nameMusicGenre"}` |
//! | delete genre | `DELETE genres/{genre_id}` |
//! | user list | `GET users` |
//! | delete user | `DELETE users/{email}` |
//! | cart lines | `GET carts/{email}/items` |
//! | add one unit | `POST carts/{email}/items` `{"recordId", "amount": 1}` |
//! | remove one unit | `DELETE carts/{email}/items/{record_id}` |
//! | cart status | `GET carts/{email}/status` |

mod wire;

use std::sync::Arc;

use moka::future::Cache;
use record_store_core::{
    CartLine, CartMutation, CartStatus, Email, Genre, GenreId, Group, GroupDraft, GroupId, Record,
    User,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::remote::{
    CartService, GenresProvider, GroupsAdmin, GroupsProvider, RecordsProvider, UsersProvider,
};

use wire::{
    AddItemBody, CartStatusDto, GenreDto, GroupBody, GroupDto, ListPayload, MutationDto,
    RecordDto, UserDto,
};

const GROUP_NAME_CACHE_CAPACITY: u64 = 1000;

/// Client for the record store REST API.
///
/// Cheaply cloneable; clones share the connection pool and cache.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    base: Url,
    group_names: Cache<GroupId, String>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base", &self.inner.base.as_str())
            .field("cached_group_names", &self.inner.group_names.entry_count())
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a client for the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let group_names = Cache::builder()
            .max_capacity(GROUP_NAME_CACHE_CAPACITY)
            .time_to_live(config.cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(RestClientInner {
                client,
                base: config.api_url.clone(),
                group_names,
            }),
        })
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    /// URL of `segments` below the base, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.inner.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| TransportError::InvalidUrl(self.inner.base.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, TransportError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                warn!(error = %e, "Record store API unreachable");
                TransportError::Unavailable(e.to_string())
            } else {
                TransportError::Http(e)
            }
        })?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Record store API returned non-success status"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: wire::error_message(&body),
            });
        }
        Ok(body)
    }

    fn parse<T: DeserializeOwned>(body: &str) -> Result<T, TransportError> {
        serde_json::from_str(body).map_err(|e| {
            error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse record store API response"
            );
            TransportError::Parse(e)
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        let body = self.send(self.inner.client.get(url)).await?;
        Self::parse(&body)
    }

    /// Parse a mutation answer; an empty body means the server sent no stock.
    fn parse_mutation(body: &str, record: &Record) -> Result<CartMutation, TransportError> {
        let dto = if body.trim().is_empty() {
            MutationDto::default()
        } else {
            Self::parse::<MutationDto>(body)?
        };
        Ok(dto.into_mutation(record.id))
    }
}

impl RecordsProvider for RestClient {
    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn get_records_by_group(&self, group_id: GroupId) -> Result<Vec<Record>, TransportError> {
        let url = self.endpoint(&["records", "group", &group_id.to_string()])?;
        let payload: ListPayload<RecordDto> = self.get_json(url).await?;
        let records: Vec<Record> = payload.into_vec().into_iter().map(Record::from).collect();
        debug!(count = records.len(), "Fetched records");
        Ok(records)
    }

    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn get_group_name(&self, group_id: GroupId) -> Result<String, TransportError> {
        if let Some(name) = self.inner.group_names.get(&group_id).await {
            debug!("Cache hit for group name");
            return Ok(name);
        }

        let url = self.endpoint(&["groups", &group_id.to_string(), "name"])?;
        let body = self.send(self.inner.client.get(url)).await?;
        let name = wire::parse_group_name(&body);

        self.inner.group_names.insert(group_id, name.clone()).await;
        Ok(name)
    }
}

impl GroupsProvider for RestClient {
    #[instrument(skip(self))]
    async fn get_groups(&self) -> Result<Vec<Group>, TransportError> {
        let url = self.endpoint(&["groups"])?;
        let payload: ListPayload<GroupDto> = self.get_json(url).await?;
        let groups: Vec<Group> = payload.into_vec().into_iter().map(Group::from).collect();

        for group in &groups {
            self.inner
                .group_names
                .insert(group.id, group.name.clone())
                .await;
        }
        debug!(count = groups.len(), "Fetched groups");
        Ok(groups)
    }
}

impl GroupsAdmin for RestClient {
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    async fn add_group(&self, draft: &GroupDraft) -> Result<(), TransportError> {
        let url = self.endpoint(&["groups"])?;
        let body = GroupBody::new(None, draft);
        self.send(self.inner.client.post(url).json(&body)).await?;
        debug!("Group added");
        Ok(())
    }

    #[instrument(skip(self, draft), fields(group_id = %group_id))]
    async fn update_group(
        &self,
        group_id: GroupId,
        draft: &GroupDraft,
    ) -> Result<(), TransportError> {
        let url = self.endpoint(&["groups", &group_id.to_string()])?;
        let body = GroupBody::new(Some(group_id), draft);
        self.send(self.inner.client.put(url).json(&body)).await?;
        self.inner.group_names.invalidate(&group_id).await;
        Ok(())
    }

    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn delete_group(&self, group_id: GroupId) -> Result<(), TransportError> {
        let url = self.endpoint(&["groups", &group_id.to_string()])?;
        self.send(self.inner.client.delete(url)).await?;
        self.inner.group_names.invalidate(&group_id).await;
        Ok(())
    }
}

impl GenresProvider for RestClient {
    #[instrument(skip(self))]
    async fn get_genres(&self) -> Result<Vec<Genre>, TransportError> {
        let url = self.endpoint(&["genres"])?;
        let payload: ListPayload<GenreDto> = self.get_json(url).await?;
        let genres: Vec<Genre> = payload
            .into_vec()
            .into_iter()
            .filter_map(GenreDto::into_genre)
            .collect();
        debug!(count = genres.len(), "Fetched genres");
        Ok(genres)
    }

    #[instrument(skip(self))]
    async fn add_genre(&self, name: &str) -> Result<(), TransportError> {
        let url = self.endpoint(&["genres"])?;
        let body = GenreDto {
            id_music_genre: None,
            name_music_genre: name.to_string(),
        };
        self.send(self.inner.client.post(url).json(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, genre), fields(genre_id = %genre.id))]
    async fn update_genre(&self, genre: &Genre) -> Result<(), TransportError> {
        let url = self.endpoint(&["genres", &genre.id.to_string()])?;
        let body = GenreDto {
            id_music_genre: Some(genre.id.as_i32()),
            name_music_genre: genre.name.clone(),
        };
        self.send(self.inner.client.put(url).json(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(genre_id = %genre_id))]
    async fn delete_genre(&self, genre_id: GenreId) -> Result<(), TransportError> {
        let url = self.endpoint(&["genres", &genre_id.to_string()])?;
        self.send(self.inner.client.delete(url)).await?;
        Ok(())
    }
}

impl UsersProvider for RestClient {
    #[instrument(skip(self))]
    async fn get_users(&self) -> Result<Vec<User>, TransportError> {
        let url = self.endpoint(&["users"])?;
        let payload: ListPayload<UserDto> = self.get_json(url).await?;
        let users: Vec<User> = payload
            .into_vec()
            .into_iter()
            .filter_map(UserDto::into_user)
            .collect();
        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }

    #[instrument(skip(self, email))]
    async fn delete_user(&self, email: &Email) -> Result<(), TransportError> {
        let url = self.endpoint(&["users", email.as_str()])?;
        self.send(self.inner.client.delete(url)).await?;
        Ok(())
    }
}

impl CartService for RestClient {
    #[instrument(skip(self, email))]
    async fn get_cart_items(&self, email: &Email) -> Result<Vec<CartLine>, TransportError> {
        let url = self.endpoint(&["carts", email.as_str(), "items"])?;
        let payload: ListPayload<RecordDto> = self.get_json(url).await?;
        Ok(payload
            .into_vec()
            .into_iter()
            .filter_map(RecordDto::into_cart_line)
            .collect())
    }

    #[instrument(skip(self, email, record), fields(record_id = %record.id))]
    async fn add_to_cart(
        &self,
        email: &Email,
        record: &Record,
    ) -> Result<CartMutation, TransportError> {
        let url = self.endpoint(&["carts", email.as_str(), "items"])?;
        let body = AddItemBody {
            record_id: record.id.as_i32(),
            amount: 1,
        };
        let response = self.send(self.inner.client.post(url).json(&body)).await?;
        Self::parse_mutation(&response, record)
    }

    #[instrument(skip(self, email, record), fields(record_id = %record.id))]
    async fn remove_from_cart(
        &self,
        email: &Email,
        record: &Record,
    ) -> Result<CartMutation, TransportError> {
        let url = self.endpoint(&["carts", email.as_str(), "items", &record.id.to_string()])?;
        let response = self.send(self.inner.client.delete(url)).await?;
        Self::parse_mutation(&response, record)
    }

    #[instrument(skip(self, email))]
    async fn get_cart_status(&self, email: &Email) -> Result<CartStatus, TransportError> {
        let url = self.endpoint(&["carts", email.as_str(), "status"])?;
        let status: CartStatusDto = self.get_json(url).await?;
        Ok(CartStatus {
            enabled: status.enabled,
        })
    }
}
