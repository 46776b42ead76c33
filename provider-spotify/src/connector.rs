//! Spotify Web API connector implementation
//!
//! Implements `CatalogSource` over the browse and playlist endpoints.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_sync::{
    Attributes, CatalogSource, ChildEntity, DetailPage, Page, SourceError, SourceResult,
    TopLevelEntity,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cursor::PageCursor;
use crate::error::{Result, SpotifyError};
use crate::types::{
    CategoriesResponse, CategoryPlaylistsResponse, ErrorResponse, Paging, Playlist,
    PlaylistTrack,
};

/// Spotify Web API base URL
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Maximum results per listing page (Web API limit)
const MAX_PAGE_SIZE: u32 = 50;

/// Wait assumed when a 429 carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Spotify Web API connector
///
/// # Features
///
/// - Browse categories, or a fixed list of category ids
/// - Category playlists keyed by `snapshot_id`
/// - Playlist details with track pages followed to the end
/// - Bearer-token authentication via `HttpClient`
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyConnector;
/// use core_sync::PagedFetcher;
///
/// let connector = SpotifyConnector::new(http_client, access_token)
///     .with_categories(vec!["pop".to_string(), "rock".to_string()]);
/// let fetcher = PagedFetcher::new(connector, config);
/// ```
pub struct SpotifyConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// OAuth 2.0 access token (client-credentials flow)
    access_token: String,

    api_base: String,
    page_size: u32,
    request_timeout: Duration,

    /// When set, these ids replace the browse-categories listing
    category_ids: Option<Vec<String>>,

    /// ISO 3166-1 alpha-2 market for category endpoints
    country: Option<String>,
}

impl SpotifyConnector {
    /// Create a new Spotify connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `access_token` - Bearer token valid for the Web API
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            api_base: SPOTIFY_API_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            category_ids: None,
            country: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Items per listing page, clamped to `1..=50`
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Restrict the top-level listing to `category_ids`
    pub fn with_categories(mut self, category_ids: Vec<String>) -> Self {
        self.category_ids = Some(category_ids);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Query string for a listing page
    fn page_query(&self, cursor: Option<&str>) -> Result<String> {
        let cursor = match cursor {
            Some(raw) => raw.parse::<PageCursor>()?,
            None => PageCursor::new(0, self.page_size),
        };

        let mut query = format!("offset={}&limit={}", cursor.offset, cursor.limit);
        if let Some(country) = &self.country {
            query.push_str(&format!("&country={}", urlencoding::encode(country)));
        }
        Ok(query)
    }

    /// Issue one GET and decode the body
    #[instrument(skip(self), fields(url = %url))]
    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let request = HttpRequest::get(url.clone())
            .bearer_token(&self.access_token)
            .header("Accept", "application/json")
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await?;

        if response.is_success() {
            debug!(status = response.status, "API request succeeded");
            return serde_json::from_slice(&response.body).map_err(|e| {
                SpotifyError::ParseError(format!("Failed to parse response from {}: {}", url, e))
            });
        }

        Err(Self::status_error(&url, &response))
    }

    fn status_error(url: &str, response: &HttpResponse) -> SpotifyError {
        if response.is_rate_limited() {
            let retry_after = response.retry_after().unwrap_or(DEFAULT_RETRY_AFTER);
            warn!(retry_after_secs = retry_after.as_secs(), "Spotify rate limit hit");
            return SpotifyError::RateLimited { retry_after };
        }

        let message = serde_json::from_slice::<ErrorResponse>(&response.body)
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| String::from_utf8_lossy(&response.body).to_string());

        warn!(status = response.status, message = %message, "API request failed");

        match response.status {
            401 | 403 => SpotifyError::AuthenticationFailed(message),
            404 => SpotifyError::NotFound {
                resource: url.to_string(),
            },
            status_code => SpotifyError::ApiError {
                status_code,
                message,
            },
        }
    }

    async fn fetch_categories(&self, cursor: Option<String>) -> Result<Page<TopLevelEntity>> {
        if let Some(ids) = &self.category_ids {
            return Ok(Page::last(ids.iter().map(|id| TopLevelEntity::new(id.clone())).collect()));
        }

        let url = format!(
            "{}/browse/categories?{}",
            self.api_base,
            self.page_query(cursor.as_deref())?
        );
        let response: CategoriesResponse = self.get_json(url).await?;

        let items = response
            .categories
            .items
            .into_iter()
            .map(|category| {
                let mut entity = TopLevelEntity::new(category.id);
                if let Some(name) = category.name {
                    entity.attributes.insert("name".to_string(), name);
                }
                entity
            })
            .collect();

        Ok(Page {
            items,
            next_cursor: PageCursor::next_from(response.categories.next.as_deref())?,
        })
    }

    async fn fetch_category_playlists(
        &self,
        category_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<ChildEntity>> {
        let url = format!(
            "{}/browse/categories/{}/playlists?{}",
            self.api_base,
            urlencoding::encode(category_id),
            self.page_query(cursor.as_deref())?
        );
        let response: CategoryPlaylistsResponse = self.get_json(url).await?;

        let items: Vec<ChildEntity> = response
            .playlists
            .items
            .into_iter()
            .flatten()
            .map(|playlist| {
                let mut child =
                    ChildEntity::new(playlist.id, playlist.snapshot_id.unwrap_or_default());
                if let Some(name) = playlist.name {
                    child.attributes.insert("name".to_string(), name);
                }
                if let Some(total) = playlist.tracks.and_then(|t| t.total) {
                    child
                        .attributes
                        .insert("total_tracks".to_string(), total.to_string());
                }
                child
            })
            .collect();

        info!(category_id, playlists = items.len(), "Listed category playlists");

        Ok(Page {
            items,
            next_cursor: PageCursor::next_from(response.playlists.next.as_deref())?,
        })
    }

    /// Playlist object plus its first page of tracks
    async fn fetch_playlist(&self, playlist_id: &str) -> Result<DetailPage> {
        let url = format!(
            "{}/playlists/{}",
            self.api_base,
            urlencoding::encode(playlist_id)
        );
        let playlist: Playlist = self.get_json(url).await?;

        Self::playlist_detail(playlist)
    }

    /// A later page from `/playlists/{id}/tracks`
    async fn fetch_playlist_tracks(&self, playlist_id: &str, cursor: &str) -> Result<DetailPage> {
        let cursor: PageCursor = cursor.parse()?;
        let url = format!(
            "{}/playlists/{}/tracks?offset={}&limit={}",
            self.api_base,
            urlencoding::encode(playlist_id),
            cursor.offset,
            cursor.limit
        );
        let tracks: Paging<PlaylistTrack> = self.get_json(url).await?;
        debug!(
            playlist_id,
            offset = cursor.offset,
            items = tracks.items.len(),
            "Fetched track page"
        );

        Ok(DetailPage {
            lists: Self::track_lists(&tracks.items),
            next_cursor: PageCursor::next_from(tracks.next.as_deref())?,
            ..DetailPage::default()
        })
    }

    fn playlist_detail(playlist: Playlist) -> Result<DetailPage> {
        let mut attributes = Attributes::new();
        attributes.insert("id".to_string(), playlist.id);

        if let Some(name) = playlist.name {
            attributes.insert("name".to_string(), name);
        }
        if let Some(description) = playlist.description {
            attributes.insert("description".to_string(), strip_newlines(&description));
        }
        if let Some(followers) = playlist.followers {
            attributes.insert("followers".to_string(), followers.total.to_string());
        }
        if let Some(owner) = playlist.owner {
            attributes.insert("owner".to_string(), owner.id);
            if let Some(display_name) = owner.display_name {
                attributes.insert("owner_name".to_string(), display_name);
            }
        }
        if let Some(snapshot_id) = &playlist.snapshot_id {
            attributes.insert("snapshot_id".to_string(), snapshot_id.clone());
        }
        if let Some(total) = playlist.tracks.total {
            attributes.insert("total_tracks".to_string(), total.to_string());
        }

        Ok(DetailPage {
            version_token: playlist.snapshot_id,
            attributes,
            lists: Self::track_lists(&playlist.tracks.items),
            next_cursor: PageCursor::next_from(playlist.tracks.next.as_deref())?,
        })
    }

    /// Track and artist ids in playlist order
    fn track_lists(items: &[PlaylistTrack]) -> BTreeMap<String, Vec<String>> {
        let mut track_ids = Vec::new();
        let mut artist_ids = Vec::new();

        for track in items.iter().filter_map(|item| item.track.as_ref()) {
            if let Some(id) = &track.id {
                track_ids.push(id.clone());
            }
            artist_ids.extend(track.artists.iter().filter_map(|artist| artist.id.clone()));
        }

        BTreeMap::from([
            ("track_ids".to_string(), track_ids),
            ("artist_ids".to_string(), artist_ids),
        ])
    }
}

/// Descriptions occasionally carry embedded line breaks
fn strip_newlines(text: &str) -> String {
    text.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

#[async_trait]
impl CatalogSource for SpotifyConnector {
    async fn top_level_page(&self, cursor: Option<String>) -> SourceResult<Page<TopLevelEntity>> {
        self.fetch_categories(cursor).await.map_err(SourceError::from)
    }

    async fn children_page(
        &self,
        parent_id: &str,
        cursor: Option<String>,
    ) -> SourceResult<Page<ChildEntity>> {
        self.fetch_category_playlists(parent_id, cursor)
            .await
            .map_err(SourceError::from)
    }

    async fn detail_page(
        &self,
        entity_id: &str,
        cursor: Option<String>,
    ) -> SourceResult<DetailPage> {
        let page = match cursor {
            None => self.fetch_playlist(entity_id).await,
            Some(cursor) => self.fetch_playlist_tracks(entity_id, &cursor).await,
        };
        page.map_err(SourceError::from)
    }
}
