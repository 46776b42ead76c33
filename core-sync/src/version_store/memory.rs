use super::VersionStore;
use crate::{Result, VersionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Version store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    records: RwLock<HashMap<String, VersionRecord>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `(entity_id, token)` pairs
    pub fn seeded<I, K, V>(entries: I, synced_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let records = entries
            .into_iter()
            .map(|(id, token)| {
                let entity_id = id.into();
                let record = VersionRecord {
                    entity_id: entity_id.clone(),
                    version_token: token.into(),
                    last_synced_at: synced_at,
                };
                (entity_id, record)
            })
            .collect();

        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn get(&self, entity_id: &str) -> Result<Option<VersionRecord>> {
        Ok(self.records.read().await.get(entity_id).cloned())
    }

    async fn put(
        &self,
        entity_id: &str,
        version_token: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        self.records.write().await.insert(
            entity_id.to_string(),
            VersionRecord {
                entity_id: entity_id.to_string(),
                version_token: version_token.to_string(),
                last_synced_at: synced_at,
            },
        );
        Ok(())
    }
}
