//! # Sync Domain Models
//!
//! Entities observed in listings, the details fetched for changed ones, the
//! version records persisted between runs, and the aggregated [`SyncResult`].

use crate::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Flat attribute map carried by every entity.
pub type Attributes = BTreeMap<String, String>;

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A top-level grouping (a category) yielded by the top-level listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLevelEntity {
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl TopLevelEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A child (a playlist) as it appears in its parent's listing.
///
/// The listing carries the version token, so change detection never needs a
/// detail call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntity {
    pub id: String,
    pub version_token: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ChildEntity {
    pub fn new(id: impl Into<String>, version_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version_token: version_token.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Full attribute set returned by a detail fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDetail {
    /// Token of the data actually returned, when the source reports one.
    pub version_token: Option<String>,
    pub attributes: Attributes,
}

/// A synced entity as reported in [`SyncResult::fetched`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub parent_id: String,
    pub version_token: String,
    pub attributes: Attributes,
}

/// Persisted per-entity bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub entity_id: String,
    pub version_token: String,
    pub last_synced_at: DateTime<Utc>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn with_next(items: Vec<T>, next_cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor.into()),
        }
    }
}

/// One page of a detail response.
///
/// Scalar `attributes` come from the first page. `lists` are accumulated
/// across pages and joined with commas once the last page is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailPage {
    pub version_token: Option<String>,
    pub attributes: Attributes,
    pub lists: BTreeMap<String, Vec<String>>,
    pub next_cursor: Option<String>,
}

/// Category of a per-entity failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    FetchFailed,
    StorageUnavailable,
    Cancelled,
}

/// Why an entity ended up in [`SyncResult::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&SyncError> for EntityFailure {
    fn from(error: &SyncError) -> Self {
        let kind = match error {
            SyncError::RateLimited { .. } => FailureKind::RateLimited,
            SyncError::StorageUnavailable(_) => FailureKind::StorageUnavailable,
            SyncError::Cancelled => FailureKind::Cancelled,
            SyncError::FetchFailed { .. } | SyncError::Config(_) => FailureKind::FetchFailed,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Aggregate outcome of one sync run.
///
/// `fetched`, `skipped` and `errors` are pairwise disjoint by entity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub run_id: SyncRunId,
    pub fetched: BTreeMap<String, Entity>,
    pub skipped: BTreeSet<String>,
    pub errors: BTreeMap<String, EntityFailure>,
    /// Set when the run stopped early; the sets then hold partial results.
    pub cancelled: bool,
}

impl SyncResult {
    pub fn new(run_id: SyncRunId) -> Self {
        Self {
            run_id,
            fetched: BTreeMap::new(),
            skipped: BTreeSet::new(),
            errors: BTreeMap::new(),
            cancelled: false,
        }
    }

    /// True when nothing failed and the run was not cancelled
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    pub fn fetched_ids(&self) -> BTreeSet<String> {
        self.fetched.keys().cloned().collect()
    }

    pub fn error_ids(&self) -> BTreeSet<String> {
        self.errors.keys().cloned().collect()
    }

    /// Number of entities the run reached a decision for
    pub fn total(&self) -> usize {
        self.fetched.len() + self.skipped.len() + self.errors.len()
    }
}
