//! Error types for the Spotify provider

use bridge_traits::error::BridgeError;
use core_sync::SourceError;
use std::time::Duration;
use thiserror::Error;

/// Spotify provider errors
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Access token missing, expired or lacking scope
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Spotify API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// A pagination cursor or `next` URL could not be interpreted
    #[error("Invalid page cursor: {0}")]
    InvalidCursor(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for Spotify operations
pub type Result<T> = std::result::Result<T, SpotifyError>;

impl SpotifyError {
    /// True when the same request may succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            SpotifyError::ApiError { status_code, .. } => *status_code >= 500,
            SpotifyError::Bridge(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<SpotifyError> for SourceError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::RateLimited { retry_after } => SourceError::RateLimited { retry_after },
            e if e.is_transient() => SourceError::Transient(e.to_string()),
            e => SourceError::Fatal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SpotifyError::ApiError {
            status_code: 404,
            message: "Resource not found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Spotify API error (status 404): Resource not found"
        );
    }

    #[test]
    fn test_source_error_classification() {
        let rate_limited: SourceError = SpotifyError::RateLimited {
            retry_after: Duration::from_secs(3),
        }
        .into();
        assert_eq!(
            rate_limited,
            SourceError::RateLimited {
                retry_after: Duration::from_secs(3)
            }
        );

        let server: SourceError = SpotifyError::ApiError {
            status_code: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert!(matches!(server, SourceError::Transient(_)));

        let timeout: SourceError =
            SpotifyError::Bridge(BridgeError::Timeout("30s".to_string())).into();
        assert!(matches!(timeout, SourceError::Transient(_)));

        let auth: SourceError = SpotifyError::AuthenticationFailed("expired".to_string()).into();
        assert!(matches!(auth, SourceError::Fatal(_)));
    }
}
