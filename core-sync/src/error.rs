use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Version store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Rate limited while fetching {entity_id}: {reason}")]
    RateLimited { entity_id: String, reason: String },

    #[error("Fetch failed for {entity_id}: {cause}")]
    FetchFailed { entity_id: String, cause: String },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Entity the failure is attributed to, when there is one
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            SyncError::RateLimited { entity_id, .. } | SyncError::FetchFailed { entity_id, .. } => {
                Some(entity_id)
            }
            _ => None,
        }
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(error: core_runtime::Error) -> Self {
        SyncError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
