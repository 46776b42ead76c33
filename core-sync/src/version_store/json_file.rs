use super::VersionStore;
use crate::{Result, SyncError, VersionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct StoredDocument {
    records: BTreeMap<String, VersionRecord>,
}

/// Borrowed view written by `persist`
#[derive(Serialize)]
struct DocumentRef<'a> {
    records: &'a BTreeMap<String, VersionRecord>,
}

/// Version store persisted as one JSON document.
///
/// Records are cached in memory after [`open`](Self::open). Every `put`
/// rewrites the document through a sibling temp file and a rename, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileVersionStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, VersionRecord>>,
}

impl JsonFileVersionStore {
    /// Open the store at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the file exists but cannot be read or
    /// parsed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let document: StoredDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    SyncError::StorageUnavailable(format!(
                        "Corrupt version file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                document.records
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SyncError::StorageUnavailable(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        debug!(path = %path.display(), records = records.len(), "Opened version file");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<String, VersionRecord>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&DocumentRef { records })
            .map_err(|e| SyncError::StorageUnavailable(e.to_string()))?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| unavailable(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| unavailable(&self.path, e))
    }
}

fn unavailable(path: &Path, error: std::io::Error) -> SyncError {
    SyncError::StorageUnavailable(format!("Failed to write {}: {}", path.display(), error))
}

#[async_trait]
impl VersionStore for JsonFileVersionStore {
    async fn get(&self, entity_id: &str) -> Result<Option<VersionRecord>> {
        Ok(self.records.lock().await.get(entity_id).cloned())
    }

    async fn put(
        &self,
        entity_id: &str,
        version_token: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.lock().await;

        let previous = records.insert(
            entity_id.to_string(),
            VersionRecord {
                entity_id: entity_id.to_string(),
                version_token: version_token.to_string(),
                last_synced_at: synced_at,
            },
        );

        // Memory must not run ahead of the document on disk
        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(record) => records.insert(entity_id.to_string(), record),
                None => records.remove(entity_id),
            };
            return Err(e);
        }
        Ok(())
    }
}
