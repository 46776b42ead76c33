//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playlist sync core:
//! - Logging and tracing infrastructure
//! - Sync configuration with fail-fast validation
//! - Event bus for sync progress
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the other crates depend on.
//! It establishes the logging conventions, the tunables shared by the fetcher
//! and orchestrator, and the broadcast mechanism used to observe a run.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
