//! # Sync Orchestrator
//!
//! Drives one sync run: walks every top-level entity, lists its children,
//! consults the [`ChangeDetector`], fetches details for changed children,
//! records new tokens, and aggregates everything into a [`SyncResult`].
//!
//! ## Workflow
//!
//! 1. Pull top-level entities from the [`Fetcher`] lazily
//! 2. Process up to `max_concurrent_workers` top-level entities at once
//! 3. For each child: skip if unchanged, otherwise fetch, then `put`
//! 4. Record per-entity failures without stopping the run
//! 5. Stop claiming new work once cancellation is requested
//!
//! Each child id is claimed by the first worker that reaches it, so a child
//! listed under two parents is processed once per run.

use crate::change_detector::ChangeDetector;
use crate::fetcher::{Fetcher, ROOT_ENTITY_ID};
use crate::models::{ChildEntity, Entity, EntityFailure, SyncResult, SyncRunId, TopLevelEntity};
use crate::version_store::VersionStore;
use crate::{Result, SyncError};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::SyncConfig;
use futures::stream::StreamExt;
use std::collections::HashSet;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Coordinates fetch, change detection and persistence for a run
pub struct SyncOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn VersionStore>,
    detector: ChangeDetector,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

/// Mutable state shared by the workers of one run
struct RunState {
    run_id: SyncRunId,
    result: Mutex<SyncResult>,
    claimed: Mutex<HashSet<String>>,
    /// Set when the fetcher reports cancellation, whichever token caused it
    interrupted: AtomicBool,
}

impl RunState {
    fn new(run_id: SyncRunId) -> Self {
        Self {
            run_id,
            result: Mutex::new(SyncResult::new(run_id)),
            claimed: Mutex::new(HashSet::new()),
            interrupted: AtomicBool::new(false),
        }
    }

    fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn result(&self) -> MutexGuard<'_, SyncResult> {
        self.result.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True for the first caller with a given id
    fn claim(&self, entity_id: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entity_id.to_string())
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if `config` fails validation
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn VersionStore>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            fetcher,
            detector: ChangeDetector::new(Arc::clone(&store)),
            store,
            config,
            clock: Arc::new(SystemClock),
            event_bus: None,
        })
    }

    /// Use `clock` for `last_synced_at` timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish run progress on `event_bus`
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run to completion
    pub async fn run(&self) -> SyncResult {
        self.run_with_cancellation(&CancellationToken::new()).await
    }

    /// Run until done or until `cancel` fires.
    ///
    /// Cancellation stops new entities from being claimed and stops paging
    /// the listings. Entities already being fetched finish and are reported;
    /// the result is marked `cancelled`. A fetcher that gives up with
    /// [`SyncError::Cancelled`] marks the result the same way.
    #[instrument(skip(self, cancel))]
    pub async fn run_with_cancellation(&self, cancel: &CancellationToken) -> SyncResult {
        let state = RunState::new(SyncRunId::new());
        let started = Instant::now();
        let run_id = state.run_id.as_str();

        info!(run_id = %run_id, workers = self.config.max_concurrent_workers, "Starting sync run");
        self.emit(SyncEvent::Started {
            run_id: run_id.clone(),
        });

        self.fetcher
            .list_top_level()
            .take_until(cancel.cancelled())
            .map(|item| {
                let state = &state;
                async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    match item {
                        Ok(top_level) => self.process_top_level(state, top_level, cancel).await,
                        Err(SyncError::Cancelled) => state.mark_interrupted(),
                        Err(e) => self.record_failure(state, ROOT_ENTITY_ID, &e),
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent_workers)
            .collect::<Vec<()>>()
            .await;

        let mut result = state.result().clone();
        result.cancelled = cancel.is_cancelled() || state.was_interrupted();

        let (fetched, skipped, failed) = (
            result.fetched.len() as u64,
            result.skipped.len() as u64,
            result.errors.len() as u64,
        );

        if result.cancelled {
            warn!(run_id = %run_id, fetched, skipped, failed, "Sync run cancelled");
            self.emit(SyncEvent::Cancelled {
                run_id,
                fetched,
                skipped,
                failed,
            });
        } else {
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(run_id = %run_id, fetched, skipped, failed, duration_ms, "Sync run completed");
            self.emit(SyncEvent::Completed {
                run_id,
                fetched,
                skipped,
                failed,
                duration_ms,
            });
        }

        result
    }

    async fn process_top_level(
        &self,
        state: &RunState,
        top_level: TopLevelEntity,
        cancel: &CancellationToken,
    ) {
        debug!(parent_id = %top_level.id, "Listing children");
        let mut children = pin!(self
            .fetcher
            .list_children(&top_level.id)
            .take_until(cancel.cancelled()));

        while let Some(item) = children.next().await {
            if cancel.is_cancelled() {
                break;
            }

            match item {
                Ok(child) => {
                    if !state.claim(&child.id) {
                        debug!(
                            entity_id = %child.id,
                            parent_id = %top_level.id,
                            "Entity already handled in this run"
                        );
                        continue;
                    }
                    self.process_child(state, &top_level.id, child).await;
                }
                Err(SyncError::Cancelled) => {
                    state.mark_interrupted();
                    break;
                }
                Err(e) => {
                    let entity_id = e.entity_id().unwrap_or(top_level.id.as_str()).to_string();
                    self.record_failure(state, &entity_id, &e);
                    break;
                }
            }
        }
    }

    async fn process_child(&self, state: &RunState, parent_id: &str, child: ChildEntity) {
        if !self.detector.has_changed(&child.id, &child.version_token).await {
            debug!(entity_id = %child.id, "Version token unchanged, skipping");
            state.result().skipped.insert(child.id.clone());
            self.emit(SyncEvent::EntitySkipped {
                run_id: state.run_id.as_str(),
                entity_id: child.id,
            });
            return;
        }

        let detail = match self.fetcher.fetch_detail(&child.id).await {
            Ok(detail) => detail,
            Err(e) => {
                self.record_failure(state, &child.id, &e);
                return;
            }
        };

        // The detail's own token describes the data we hold, when present
        let version_token = detail
            .version_token
            .filter(|token| !token.is_empty())
            .unwrap_or(child.version_token);

        let mut attributes = child.attributes;
        attributes.extend(detail.attributes);

        let entity = Entity {
            id: child.id,
            parent_id: parent_id.to_string(),
            version_token,
            attributes,
        };

        if !entity.version_token.is_empty() {
            if let Err(e) = self
                .store
                .put(&entity.id, &entity.version_token, self.clock.now())
                .await
            {
                warn!(
                    entity_id = %entity.id,
                    error = %e,
                    "Failed to record version token, entity will be fetched again next run"
                );
            }
        }

        debug!(entity_id = %entity.id, version_token = %entity.version_token, "Entity fetched");
        self.emit(SyncEvent::EntityFetched {
            run_id: state.run_id.as_str(),
            entity_id: entity.id.clone(),
            parent_id: entity.parent_id.clone(),
            version_token: entity.version_token.clone(),
        });
        state.result().fetched.insert(entity.id.clone(), entity);
    }

    fn record_failure(&self, state: &RunState, entity_id: &str, error: &SyncError) {
        warn!(entity_id, error = %error, "Entity failed");
        state
            .result()
            .errors
            .insert(entity_id.to_string(), EntityFailure::from(error));
        self.emit(SyncEvent::EntityFailed {
            run_id: state.run_id.as_str(),
            entity_id: entity_id.to_string(),
            message: error.to_string(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error for the run
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }
}
