//! # Version Store
//!
//! Durable mapping from entity id to the last version token a successful
//! fetch was recorded with.
//!
//! Three backends are provided:
//! - [`InMemoryVersionStore`] for tests and one-shot runs
//! - [`JsonFileVersionStore`] for a single JSON document on disk
//! - [`SqliteVersionStore`] for a `version_records` table
//!
//! All backends treat `put` as an upsert and are safe to share between
//! concurrent workers behind an `Arc`.

mod json_file;
mod memory;
mod sqlite;

pub use json_file::JsonFileVersionStore;
pub use memory::InMemoryVersionStore;
pub use sqlite::SqliteVersionStore;

use crate::{Result, VersionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence for per-entity version tokens
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Look up the record for an entity
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the backing medium cannot be read
    async fn get(&self, entity_id: &str) -> Result<Option<VersionRecord>>;

    /// Record a token for an entity, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the write does not persist
    async fn put(&self, entity_id: &str, version_token: &str, synced_at: DateTime<Utc>)
        -> Result<()>;

    /// True when a record exists and its token equals `version_token`
    async fn matches(&self, entity_id: &str, version_token: &str) -> Result<bool> {
        Ok(self
            .get(entity_id)
            .await?
            .is_some_and(|record| record.version_token == version_token))
    }
}
