//! # Change Detector
//!
//! Decides whether an entity needs its detail fetched by comparing the token
//! observed in a listing against the stored one.

use crate::version_store::VersionStore;
use std::sync::Arc;
use tracing::{trace, warn};

/// Compares observed version tokens with the [`VersionStore`]
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn VersionStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self { store }
    }

    /// Returns `true` when the entity must be fetched.
    ///
    /// An empty token, a missing record, a differing token, or an unreadable
    /// store all count as changed. Only an exact match against a stored
    /// record is unchanged.
    pub async fn has_changed(&self, entity_id: &str, observed_token: &str) -> bool {
        if observed_token.is_empty() {
            trace!(entity_id, "Empty version token, treating as changed");
            return true;
        }

        match self.store.matches(entity_id, observed_token).await {
            Ok(unchanged) => !unchanged,
            Err(e) => {
                warn!(entity_id, error = %e, "Version store read failed, treating as changed");
                true
            }
        }
    }
}
