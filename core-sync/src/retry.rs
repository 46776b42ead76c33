//! # Call Execution
//!
//! Runs one logical upstream call under the shared request budget, honoring
//! retry-after signals and backing off exponentially on transient failures.

use crate::rate_limiter::{suspend, RateLimiter};
use crate::{Result, SyncError};
use core_runtime::SyncConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Failure reported by a single upstream call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Upstream asked us to slow down for `retry_after`
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Worth retrying (5xx, timeouts, dropped connections)
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Retrying will not help (4xx, malformed payloads)
    #[error("{0}")]
    Fatal(String),
}

/// Applies budget, retry-after and backoff rules to upstream calls
#[derive(Clone)]
pub struct CallExecutor {
    limiter: Arc<RateLimiter>,
    config: SyncConfig,
    cancel: Option<CancellationToken>,
}

impl CallExecutor {
    pub fn new(limiter: Arc<RateLimiter>, config: SyncConfig) -> Self {
        Self {
            limiter,
            config,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run `op` until it succeeds or a retry rule gives up.
    ///
    /// Every attempt takes a slot from the budget. When `interruptible` is
    /// set, budget and retry waits abort with [`SyncError::Cancelled`] once
    /// cancellation is requested; detail fetches run uninterrupted so an
    /// entity that started is always finished.
    pub async fn call<T, F, Fut>(
        &self,
        entity_id: &str,
        interruptible: bool,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, SourceError>>,
    {
        let cancel = if interruptible {
            self.cancel.as_ref()
        } else {
            None
        };
        let check_interval = self.config.cancellation_check_interval;

        let mut rate_limited = 0u32;
        let mut transient = 0u32;

        loop {
            self.limiter.acquire(cancel, check_interval).await?;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match error {
                SourceError::RateLimited { retry_after } => {
                    if retry_after > self.config.max_retry_after {
                        warn!(
                            entity_id,
                            retry_after_secs = retry_after.as_secs(),
                            "Retry-after exceeds maximum tolerated wait"
                        );
                        return Err(SyncError::RateLimited {
                            entity_id: entity_id.to_string(),
                            reason: format!(
                                "retry-after of {:?} exceeds limit of {:?}",
                                retry_after, self.config.max_retry_after
                            ),
                        });
                    }
                    if rate_limited >= self.config.max_retries {
                        warn!(
                            entity_id,
                            attempts = rate_limited + 1,
                            "Rate limit retries exhausted"
                        );
                        return Err(SyncError::RateLimited {
                            entity_id: entity_id.to_string(),
                            reason: format!("still rate limited after {} retries", rate_limited),
                        });
                    }
                    rate_limited += 1;
                    debug!(
                        entity_id,
                        retry_after_ms = retry_after.as_millis() as u64,
                        attempt = rate_limited,
                        "Rate limited, waiting before retry"
                    );
                    suspend(retry_after, cancel, check_interval).await?;
                }
                SourceError::Transient(message) => {
                    if transient >= self.config.max_retries {
                        warn!(entity_id, error = %message, "Transient failure retries exhausted");
                        return Err(SyncError::FetchFailed {
                            entity_id: entity_id.to_string(),
                            cause: format!("{} (after {} retries)", message, transient),
                        });
                    }
                    let backoff = self.config.backoff_for(transient);
                    transient += 1;
                    debug!(
                        entity_id,
                        error = %message,
                        backoff_ms = backoff.as_millis() as u64,
                        attempt = transient,
                        "Transient failure, backing off"
                    );
                    suspend(backoff, cancel, check_interval).await?;
                }
                SourceError::Fatal(message) => {
                    return Err(SyncError::FetchFailed {
                        entity_id: entity_id.to_string(),
                        cause: message,
                    });
                }
            }
        }
    }
}
