//! # Spotify Provider
//!
//! Implements `CatalogSource` for the Spotify Web API.
//!
//! ## Overview
//!
//! This module provides:
//! - Category listing via `/browse/categories`, or a fixed set of category ids
//! - Category playlists with `next`-URL pagination; the playlist `snapshot_id`
//!   is the version token
//! - Playlist details with the remaining track pages appended
//! - Mapping of 429/`Retry-After`, 5xx and transport failures onto
//!   `SourceError` so the sync fetcher can retry them
//!
//! The connector makes exactly one HTTP request per call. Throttling and
//! retries belong to `core_sync::PagedFetcher`.

pub mod connector;
pub mod cursor;
pub mod error;
pub mod types;

pub use connector::SpotifyConnector;
pub use cursor::PageCursor;
pub use error::{Result, SpotifyError};
