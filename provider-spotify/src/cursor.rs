//! Offset/limit page cursors
//!
//! Spotify pages carry the URL of the next page. The connector keeps only its
//! `offset` and `limit` query parameters and hands them to the sync layer as
//! an opaque `offset:limit` string.

use crate::error::{Result, SpotifyError};
use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: u32,
    pub limit: u32,
}

impl PageCursor {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// Extract `offset` and `limit` from a paging object's `next` URL
    pub fn from_next_url(next: &str) -> Result<Self> {
        let url = Url::parse(next)
            .map_err(|e| SpotifyError::InvalidCursor(format!("{}: {}", next, e)))?;

        let mut offset = None;
        let mut limit = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "offset" => offset = value.parse::<u32>().ok(),
                "limit" => limit = value.parse::<u32>().ok(),
                _ => {}
            }
        }

        match (offset, limit) {
            (Some(offset), Some(limit)) => Ok(Self { offset, limit }),
            _ => Err(SpotifyError::InvalidCursor(format!(
                "missing offset or limit in {}",
                next
            ))),
        }
    }

    /// Cursor for the page after `next`, if any
    pub fn next_from(next: Option<&str>) -> Result<Option<String>> {
        next.map(|url| Self::from_next_url(url).map(|cursor| cursor.to_string()))
            .transpose()
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.offset, self.limit)
    }
}

impl FromStr for PageCursor {
    type Err = SpotifyError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SpotifyError::InvalidCursor(s.to_string());
        let (offset, limit) = s.split_once(':').ok_or_else(invalid)?;

        Ok(Self {
            offset: offset.parse().map_err(|_| invalid())?,
            limit: limit.parse().map_err(|_| invalid())?,
        })
    }
}
