use super::VersionStore;
use crate::{Result, SyncError, VersionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

/// SQLite implementation of [`VersionStore`]
pub struct SqliteVersionStore {
    pool: SqlitePool,
}

/// Database row representation of a version record
#[derive(Debug, FromRow)]
struct VersionRecordRow {
    entity_id: String,
    version_token: String,
    last_synced_at: i64,
}

impl TryFrom<VersionRecordRow> for VersionRecord {
    type Error = SyncError;

    fn try_from(row: VersionRecordRow) -> Result<Self> {
        let last_synced_at = DateTime::<Utc>::from_timestamp_millis(row.last_synced_at)
            .ok_or_else(|| {
                SyncError::StorageUnavailable(format!(
                    "Invalid last_synced_at for {}: {}",
                    row.entity_id, row.last_synced_at
                ))
            })?;

        Ok(VersionRecord {
            entity_id: row.entity_id,
            version_token: row.version_token,
            last_synced_at,
        })
    }
}

impl SqliteVersionStore {
    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and make sure the schema exists
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be opened
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database gets its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage_error)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(storage_error)?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create the `version_records` table if it does not exist
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS version_records (
                entity_id TEXT PRIMARY KEY NOT NULL,
                version_token TEXT NOT NULL,
                last_synced_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM version_records")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(count.0)
    }
}

fn storage_error(e: sqlx::Error) -> SyncError {
    SyncError::StorageUnavailable(e.to_string())
}

#[async_trait]
impl VersionStore for SqliteVersionStore {
    async fn get(&self, entity_id: &str) -> Result<Option<VersionRecord>> {
        let row = sqlx::query_as::<_, VersionRecordRow>(
            r#"
            SELECT entity_id, version_token, last_synced_at
            FROM version_records
            WHERE entity_id = ?
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(VersionRecord::try_from).transpose()
    }

    async fn put(
        &self,
        entity_id: &str,
        version_token: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO version_records (entity_id, version_token, last_synced_at)
            VALUES (?, ?, ?)
            ON CONFLICT(entity_id) DO UPDATE SET
                version_token = excluded.version_token,
                last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(entity_id)
        .bind(version_token)
        .bind(synced_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}
