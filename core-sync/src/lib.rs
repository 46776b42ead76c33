//! # Sync Module
//!
//! Incremental extraction of a two-level catalog (categories and the
//! playlists inside them), fetching details only for entities whose version
//! token moved since the last recorded sync.
//!
//! ## Components
//!
//! - **Version Store** (`version_store`): Durable entity id to token mapping,
//!   with in-memory, JSON file and SQLite backends
//! - **Change Detector** (`change_detector`): Decides fetch vs. skip from an observed token
//! - **Request Budget** (`rate_limiter`): Fixed-window limit shared by every worker
//! - **Call Execution** (`retry`): Retry-after handling and exponential backoff per call
//! - **Fetcher** (`fetcher`): Lazy paginated listings and detail retrieval over a `CatalogSource`
//! - **Sync Orchestrator** (`orchestrator`): Bounded-concurrency run producing a `SyncResult`
//!
//! ## Example
//!
//! ```ignore
//! use core_sync::{InMemoryVersionStore, PagedFetcher, SyncOrchestrator};
//! use std::sync::Arc;
//!
//! let fetcher = Arc::new(PagedFetcher::new(source, config.clone()));
//! let store = Arc::new(InMemoryVersionStore::new());
//! let orchestrator = SyncOrchestrator::new(fetcher, store, config)?;
//!
//! let result = orchestrator.run().await;
//! println!("fetched {} skipped {}", result.fetched.len(), result.skipped.len());
//! ```

pub mod change_detector;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod version_store;

pub use change_detector::ChangeDetector;
pub use error::{Result, SyncError};
pub use fetcher::{CatalogSource, Fetcher, PagedFetcher, SourceResult, ROOT_ENTITY_ID};
pub use models::{
    Attributes, ChildEntity, DetailPage, Entity, EntityDetail, EntityFailure, FailureKind, Page,
    SyncResult, SyncRunId, TopLevelEntity, VersionRecord,
};
pub use orchestrator::SyncOrchestrator;
pub use rate_limiter::RateLimiter;
pub use retry::{CallExecutor, SourceError};
pub use version_store::{
    InMemoryVersionStore, JsonFileVersionStore, SqliteVersionStore, VersionStore,
};

// Re-exported so callers configure runs without a direct core-runtime dependency
pub use core_runtime::SyncConfig;
