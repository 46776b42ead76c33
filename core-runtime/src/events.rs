//! # Event Bus System
//!
//! Provides an event-driven view of sync runs using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wrapping the [`SyncEvent`] lifecycle
//! - **EventBus**: Central broadcast channel for publishing events
//!
//! Publishing never blocks and never fails a run: when nobody is subscribed the
//! send error is simply dropped by the emitter.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         run_id: "run-1".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::SendError, Receiver};

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Top-level event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "payload")]
pub enum CoreEvent {
    Sync(SyncEvent),
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted over the life of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Run initiated.
    Started {
        /// Unique identifier for this run.
        run_id: String,
    },
    /// An entity's detail was fetched and its new token recorded.
    EntityFetched {
        run_id: String,
        entity_id: String,
        parent_id: String,
        version_token: String,
    },
    /// An entity's token was unchanged; no detail call was made.
    EntitySkipped {
        run_id: String,
        entity_id: String,
    },
    /// An entity could not be processed in this run.
    EntityFailed {
        run_id: String,
        entity_id: String,
        /// Human-readable error message.
        message: String,
    },
    /// Run finished processing every pair.
    Completed {
        run_id: String,
        fetched: u64,
        skipped: u64,
        failed: u64,
        duration_ms: u64,
    },
    /// Run stopped early after a cancellation request.
    Cancelled {
        run_id: String,
        fetched: u64,
        skipped: u64,
        failed: u64,
    },
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by every emitter and subscriber.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
