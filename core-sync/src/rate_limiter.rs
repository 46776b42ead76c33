//! # Request Budget
//!
//! Fixed-window limiter shared by every worker of a run. At most
//! `max_requests` calls are admitted per window; callers beyond that suspend
//! until the window resets.
//!
//! Waits use `tokio::time`, so tests can drive them with a paused clock.

use crate::{Result, SyncError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct Window {
    started_at: Instant,
    used: u32,
}

/// Shared fixed-window request budget
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(Window {
                started_at: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Take one slot from the budget, suspending until one is free.
    ///
    /// With a `cancel` token the wait is sliced by `check_interval` and
    /// returns [`SyncError::Cancelled`] once cancellation is observed. A
    /// token that is already cancelled is refused without taking a slot.
    pub async fn acquire(
        &self,
        cancel: Option<&CancellationToken>,
        check_interval: Duration,
    ) -> Result<()> {
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(SyncError::Cancelled);
            }

            let wait = {
                let mut window = self.state.lock().await;
                let now = Instant::now();

                if now.duration_since(window.started_at) >= self.window {
                    window.started_at = now;
                    window.used = 0;
                }

                if window.used < self.max_requests {
                    window.used += 1;
                    return Ok(());
                }

                (window.started_at + self.window).saturating_duration_since(now)
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                "Request budget exhausted, waiting for window reset"
            );
            suspend(wait, cancel, check_interval).await?;
        }
    }

    /// Slots still available in the current window
    pub async fn remaining(&self) -> u32 {
        let window = self.state.lock().await;
        if window.started_at.elapsed() >= self.window {
            self.max_requests
        } else {
            self.max_requests.saturating_sub(window.used)
        }
    }
}

/// Sleep for `duration`, optionally interruptible.
///
/// Without a token this is a plain sleep. With one, cancellation is checked
/// before every slice of at most `check_interval`.
pub(crate) async fn suspend(
    duration: Duration,
    cancel: Option<&CancellationToken>,
    check_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + duration;

    let Some(token) = cancel else {
        tokio::time::sleep_until(deadline).await;
        return Ok(());
    };

    let slice = check_interval.max(Duration::from_millis(1));
    loop {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        sleep(slice.min(deadline - now)).await;
    }
}
