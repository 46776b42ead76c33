//! Spotify Web API response types
//!
//! Data structures for deserializing the browse and playlist endpoints.
//! Only the fields the connector reads are modelled.

use serde::Deserialize;

/// Generic paging object
///
/// See: https://developer.spotify.com/documentation/web-api/concepts/api-calls#pagination
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,

    /// URL of the next page, absent on the last page
    #[serde(default)]
    pub next: Option<String>,

    /// Item count across all pages
    #[serde(default)]
    pub total: Option<u64>,
}

/// `GET /browse/categories` response
#[derive(Debug, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Paging<Category>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `GET /browse/categories/{id}/playlists` response
///
/// Items can be `null` when a playlist is unavailable in the market.
#[derive(Debug, Deserialize)]
pub struct CategoryPlaylistsResponse {
    pub playlists: Paging<Option<SimplifiedPlaylist>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedPlaylist {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub tracks: Option<TracksRef>,
}

/// Track summary embedded in simplified playlists
#[derive(Debug, Clone, Deserialize)]
pub struct TracksRef {
    #[serde(default)]
    pub total: Option<u64>,
}

/// `GET /playlists/{id}` response
#[derive(Debug, Clone, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub followers: Option<Followers>,
    #[serde(default)]
    pub owner: Option<Owner>,
    /// First page of tracks; later pages come from `/playlists/{id}/tracks`
    pub tracks: Paging<PlaylistTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Followers {
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Playlist item; `track` is `null` for removed or local tracks
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrack {
    #[serde(default)]
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    #[serde(default)]
    pub id: Option<String>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}
