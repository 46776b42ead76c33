//! # Sync Configuration Module
//!
//! Provides the tunables shared by the fetcher and the sync orchestrator.
//!
//! ## Overview
//!
//! The configuration uses a builder pattern to construct a [`SyncConfig`].
//! Every value is validated up front so a bad deployment fails before the
//! first upstream call rather than halfway through a run.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::SyncConfig;
//! use std::time::Duration;
//!
//! let config = SyncConfig::builder()
//!     .max_requests_per_window(100)
//!     .window_duration(Duration::from_secs(30))
//!     .max_retries(5)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.max_requests_per_window, 100);
//! ```
//!
//! ## Environment Overrides
//!
//! [`SyncConfig::from_env`] starts from the defaults and applies any
//! `PLAYLIST_SYNC_*` variables that are set:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PLAYLIST_SYNC_MAX_REQUESTS_PER_WINDOW` | `max_requests_per_window` |
//! | `PLAYLIST_SYNC_WINDOW_SECS` | `window_duration` |
//! | `PLAYLIST_SYNC_MAX_RETRIES` | `max_retries` |
//! | `PLAYLIST_SYNC_BACKOFF_BASE_MS` | `backoff_base` |
//! | `PLAYLIST_SYNC_BACKOFF_CAP_MS` | `backoff_cap` |
//! | `PLAYLIST_SYNC_CANCEL_CHECK_MS` | `cancellation_check_interval` |
//! | `PLAYLIST_SYNC_MAX_RETRY_AFTER_SECS` | `max_retry_after` |
//! | `PLAYLIST_SYNC_WORKERS` | `max_concurrent_workers` |
//! | `PLAYLIST_SYNC_PAGE_SIZE` | `page_size` |
//! | `PLAYLIST_SYNC_REQUEST_TIMEOUT_SECS` | `request_timeout` |

use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

/// Largest page the catalog API accepts for paged listings
pub const MAX_PAGE_SIZE: u32 = 50;

/// Configuration for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum upstream calls allowed within one `window_duration`
    pub max_requests_per_window: u32,

    /// Length of the request budget window
    pub window_duration: Duration,

    /// Maximum retries per call, for both throttling and transient failures
    pub max_retries: u32,

    /// First backoff delay after a transient failure
    pub backoff_base: Duration,

    /// Upper bound on any single backoff delay
    pub backoff_cap: Duration,

    /// How often long waits re-check the cancellation token
    pub cancellation_check_interval: Duration,

    /// Longest retry-after the fetcher will honour before giving up
    pub max_retry_after: Duration,

    /// Number of top-level entities processed concurrently
    pub max_concurrent_workers: usize,

    /// Items requested per page on paged listings
    pub page_size: u32,

    /// Per-request timeout handed to the HTTP client
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 100,
            window_duration: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(30),
            cancellation_check_interval: Duration::from_millis(250),
            max_retry_after: Duration::from_secs(120),
            max_concurrent_workers: 4,
            page_size: MAX_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Creates a new builder seeded with the defaults.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Loads the defaults overlaid with `PLAYLIST_SYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(v) = parse_var::<u32>(&lookup, "PLAYLIST_SYNC_MAX_REQUESTS_PER_WINDOW")? {
            builder = builder.max_requests_per_window(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PLAYLIST_SYNC_WINDOW_SECS")? {
            builder = builder.window_duration(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<u32>(&lookup, "PLAYLIST_SYNC_MAX_RETRIES")? {
            builder = builder.max_retries(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PLAYLIST_SYNC_BACKOFF_BASE_MS")? {
            builder = builder.backoff_base(Duration::from_millis(v));
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PLAYLIST_SYNC_BACKOFF_CAP_MS")? {
            builder = builder.backoff_cap(Duration::from_millis(v));
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PLAYLIST_SYNC_CANCEL_CHECK_MS")? {
            builder = builder.cancellation_check_interval(Duration::from_millis(v));
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PLAYLIST_SYNC_MAX_RETRY_AFTER_SECS")? {
            builder = builder.max_retry_after(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<usize>(&lookup, "PLAYLIST_SYNC_WORKERS")? {
            builder = builder.max_concurrent_workers(v);
        }
        if let Some(v) = parse_var::<u32>(&lookup, "PLAYLIST_SYNC_PAGE_SIZE")? {
            builder = builder.page_size(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "PLAYLIST_SYNC_REQUEST_TIMEOUT_SECS")? {
            builder = builder.request_timeout(Duration::from_secs(v));
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_window == 0 {
            return Err(Error::Config(
                "max_requests_per_window must be greater than 0".to_string(),
            ));
        }

        if self.window_duration.is_zero() {
            return Err(Error::Config(
                "window_duration must be greater than 0".to_string(),
            ));
        }

        if self.backoff_base.is_zero() {
            return Err(Error::Config("backoff_base must be greater than 0".to_string()));
        }

        if self.backoff_cap < self.backoff_base {
            return Err(Error::Config(format!(
                "backoff_cap ({:?}) must not be smaller than backoff_base ({:?})",
                self.backoff_cap, self.backoff_base
            )));
        }

        if self.cancellation_check_interval.is_zero() {
            return Err(Error::Config(
                "cancellation_check_interval must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_workers == 0 {
            return Err(Error::Config(
                "max_concurrent_workers must be at least 1".to_string(),
            ));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be between 1 and {} (got {})",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(None),
    }
}

/// Builder for constructing [`SyncConfig`] instances.
///
/// Unset fields keep their [`Default`] values; [`build`](Self::build) runs
/// [`SyncConfig::validate`].
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn max_requests_per_window(mut self, max: u32) -> Self {
        self.config.max_requests_per_window = max;
        self
    }

    pub fn window_duration(mut self, window: Duration) -> Self {
        self.config.window_duration = window;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.config.backoff_base = base;
        self
    }

    pub fn backoff_cap(mut self, cap: Duration) -> Self {
        self.config.backoff_cap = cap;
        self
    }

    pub fn cancellation_check_interval(mut self, interval: Duration) -> Self {
        self.config.cancellation_check_interval = interval;
        self
    }

    pub fn max_retry_after(mut self, max: Duration) -> Self {
        self.config.max_retry_after = max;
        self
    }

    pub fn max_concurrent_workers(mut self, workers: usize) -> Self {
        self.config.max_concurrent_workers = workers;
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid field.
    pub fn build(self) -> Result<SyncConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
