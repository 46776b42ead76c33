//! Integration tests for incremental sync runs
//!
//! These tests drive the orchestrator end to end over a scripted catalog:
//! - First run fetches everything, an immediate second run fetches nothing
//! - Changed tokens are refetched, unchanged ones skipped
//! - Failures stay isolated to the entity or listing that failed
//! - Retry-after waits, cancellation and worker bounds behave as configured

use async_trait::async_trait;
use bridge_traits::time::ManualClock;
use chrono::{DateTime, TimeZone, Utc};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{
    CatalogSource, ChildEntity, DetailPage, FailureKind, InMemoryVersionStore,
    JsonFileVersionStore, Page, PagedFetcher, Result, SourceError, SourceResult,
    SqliteVersionStore, SyncConfig, SyncError, SyncOrchestrator, TopLevelEntity, VersionRecord,
    VersionStore,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Implementations
// ============================================================================

#[derive(Default)]
struct CatalogState {
    categories: Vec<String>,
    playlists: HashMap<String, Vec<(String, String)>>,
    page_size: usize,
    /// Categories per top-level page; 0 returns them all at once
    top_level_page_size: usize,
    top_level_fails: bool,
    top_level_rate_limit: Option<Duration>,
    failing_listings: HashSet<String>,
    failing_details: HashSet<String>,
    rate_limited_once: HashMap<String, Duration>,
    detail_delay: Option<Duration>,
    cancel_on_detail: Option<CancellationToken>,
}

/// Scripted two-level catalog that counts every detail request
#[derive(Default)]
struct MockCatalog {
    state: Mutex<CatalogState>,
    detail_calls: Mutex<HashMap<String, u32>>,
    top_level_calls: AtomicUsize,
    children_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCatalog {
    fn new() -> Arc<Self> {
        let catalog = Self::default();
        catalog.state.lock().unwrap().page_size = 50;
        Arc::new(catalog)
    }

    fn set_category(&self, category: &str, playlists: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        if !state.categories.iter().any(|c| c == category) {
            state.categories.push(category.to_string());
        }
        state.playlists.insert(
            category.to_string(),
            playlists
                .iter()
                .map(|(id, token)| (id.to_string(), token.to_string()))
                .collect(),
        );
    }

    fn with_state(&self, f: impl FnOnce(&mut CatalogState)) {
        f(&mut self.state.lock().unwrap());
    }

    fn detail_calls(&self, entity_id: &str) -> u32 {
        self.detail_calls
            .lock()
            .unwrap()
            .get(entity_id)
            .copied()
            .unwrap_or(0)
    }

    fn total_detail_calls(&self) -> u32 {
        self.detail_calls.lock().unwrap().values().sum()
    }

    fn current_token(&self, entity_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .playlists
            .values()
            .flatten()
            .find(|(id, _)| id == entity_id)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl CatalogSource for MockCatalog {
    async fn top_level_page(
        &self,
        cursor: Option<String>,
    ) -> SourceResult<Page<TopLevelEntity>> {
        self.top_level_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        if state.top_level_fails {
            return Err(SourceError::Fatal("HTTP 500 from categories".to_string()));
        }
        if let Some(retry_after) = state.top_level_rate_limit {
            return Err(SourceError::RateLimited { retry_after });
        }

        let all: Vec<TopLevelEntity> = state
            .categories
            .iter()
            .map(|id| TopLevelEntity::new(id.clone()))
            .collect();
        if state.top_level_page_size == 0 {
            return Ok(Page::last(all));
        }

        let offset: usize = cursor.as_deref().unwrap_or("0").parse().unwrap();
        let end = (offset + state.top_level_page_size).min(all.len());
        let items = all[offset..end].to_vec();
        Ok(if end < all.len() {
            Page::with_next(items, end.to_string())
        } else {
            Page::last(items)
        })
    }

    async fn children_page(
        &self,
        parent_id: &str,
        cursor: Option<String>,
    ) -> SourceResult<Page<ChildEntity>> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        if state.failing_listings.contains(parent_id) {
            return Err(SourceError::Fatal(format!("HTTP 404 listing {}", parent_id)));
        }

        let all = state.playlists.get(parent_id).cloned().unwrap_or_default();
        let offset: usize = cursor.as_deref().unwrap_or("0").parse().unwrap();
        let end = (offset + state.page_size).min(all.len());
        let items = all[offset..end]
            .iter()
            .map(|(id, token)| ChildEntity::new(id.clone(), token.clone()))
            .collect();

        Ok(if end < all.len() {
            Page::with_next(items, end.to_string())
        } else {
            Page::last(items)
        })
    }

    async fn detail_page(
        &self,
        entity_id: &str,
        _cursor: Option<String>,
    ) -> SourceResult<DetailPage> {
        *self
            .detail_calls
            .lock()
            .unwrap()
            .entry(entity_id.to_string())
            .or_insert(0) += 1;

        let (fails, rate_limit, delay, cancel) = {
            let mut state = self.state.lock().unwrap();
            (
                state.failing_details.contains(entity_id),
                state.rate_limited_once.remove(entity_id),
                state.detail_delay,
                state.cancel_on_detail.take(),
            )
        };

        if let Some(token) = cancel {
            token.cancel();
        }
        if fails {
            return Err(SourceError::Fatal(format!("HTTP 404 for {}", entity_id)));
        }
        if let Some(retry_after) = rate_limit {
            return Err(SourceError::RateLimited { retry_after });
        }

        if let Some(delay) = delay {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let mut page = DetailPage {
            version_token: self.current_token(entity_id),
            ..DetailPage::default()
        };
        page.attributes
            .insert("name".to_string(), format!("Playlist {}", entity_id));
        Ok(page)
    }
}

/// Version store whose writes can be switched off
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryVersionStore,
    fail_puts: AtomicBool,
}

#[async_trait]
impl VersionStore for FlakyStore {
    async fn get(&self, entity_id: &str) -> Result<Option<VersionRecord>> {
        self.inner.get(entity_id).await
    }

    async fn put(&self, entity_id: &str, token: &str, synced_at: DateTime<Utc>) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(SyncError::StorageUnavailable("disk full".to_string()));
        }
        self.inner.put(entity_id, token, synced_at).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> SyncConfig {
    SyncConfig::builder()
        .max_concurrent_workers(2)
        .max_retries(2)
        .backoff_base(Duration::from_millis(10))
        .backoff_cap(Duration::from_millis(100))
        .cancellation_check_interval(Duration::from_millis(10))
        .build()
        .unwrap()
}

fn orchestrator(
    catalog: &Arc<MockCatalog>,
    store: Arc<dyn VersionStore>,
    config: SyncConfig,
) -> SyncOrchestrator {
    let fetcher = PagedFetcher::new(Arc::clone(catalog), config.clone());
    SyncOrchestrator::new(Arc::new(fetcher), store, config).unwrap()
}

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pop_and_rock() -> Arc<MockCatalog> {
    let catalog = MockCatalog::new();
    catalog.set_category("pop", &[("p1", "v1"), ("p2", "v1")]);
    catalog.set_category("rock", &[("p3", "v1")]);
    catalog
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_run_fetches_everything() {
    let catalog = pop_and_rock();
    let store = Arc::new(InMemoryVersionStore::new());
    let orchestrator = orchestrator(&catalog, store.clone(), test_config());

    let result = orchestrator.run().await;

    assert!(result.is_clean());
    assert_eq!(result.fetched_ids(), ids(&["p1", "p2", "p3"]));
    assert!(result.skipped.is_empty());
    assert_eq!(result.fetched["p3"].parent_id, "rock");
    assert_eq!(result.fetched["p1"].attributes["name"], "Playlist p1");
    assert!(store.matches("p1", "v1").await.unwrap());
    assert!(store.matches("p3", "v1").await.unwrap());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let catalog = pop_and_rock();
    let store = Arc::new(InMemoryVersionStore::new());
    let orchestrator = orchestrator(&catalog, store, test_config());

    orchestrator.run().await;
    let calls_after_first = catalog.total_detail_calls();
    let second = orchestrator.run().await;

    assert!(second.fetched.is_empty());
    assert_eq!(second.skipped, ids(&["p1", "p2", "p3"]));
    assert!(second.errors.is_empty());
    assert_eq!(catalog.total_detail_calls(), calls_after_first);
}

#[tokio::test]
async fn test_changed_token_is_refetched() {
    let catalog = MockCatalog::new();
    catalog.set_category("pop", &[("p1", "v2"), ("p2", "v1")]);
    let store = Arc::new(InMemoryVersionStore::seeded(
        [("p1", "v1"), ("p2", "v1")],
        Utc::now(),
    ));
    let orchestrator = orchestrator(&catalog, store.clone(), test_config());

    let result = orchestrator.run().await;

    assert_eq!(result.fetched_ids(), ids(&["p1"]));
    assert_eq!(result.skipped, ids(&["p2"]));
    assert_eq!(result.fetched["p1"].version_token, "v2");
    assert!(store.matches("p1", "v2").await.unwrap());
    assert_eq!(catalog.detail_calls("p2"), 0);
}

#[tokio::test]
async fn test_failed_detail_is_isolated() {
    let catalog = pop_and_rock();
    catalog.with_state(|s| {
        s.failing_details.insert("p3".to_string());
    });
    let store = Arc::new(InMemoryVersionStore::new());
    let orchestrator = orchestrator(&catalog, store.clone(), test_config());

    let result = orchestrator.run().await;

    assert_eq!(result.fetched_ids(), ids(&["p1", "p2"]));
    assert_eq!(result.error_ids(), ids(&["p3"]));
    assert_eq!(result.errors["p3"].kind, FailureKind::FetchFailed);
    assert!(store.get("p3").await.unwrap().is_none());
    assert!(!result.cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_is_waited_out() {
    let catalog = MockCatalog::new();
    catalog.set_category("pop", &[("p1", "v1")]);
    catalog.with_state(|s| {
        s.rate_limited_once
            .insert("p1".to_string(), Duration::from_secs(2));
    });
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );

    let start = tokio::time::Instant::now();
    let result = orchestrator.run().await;

    assert_eq!(result.fetched_ids(), ids(&["p1"]));
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(catalog.detail_calls("p1"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_rate_limit_is_recorded() {
    let catalog = MockCatalog::new();
    catalog.set_category("pop", &[("p1", "v1")]);
    catalog.with_state(|s| {
        s.rate_limited_once
            .insert("p1".to_string(), Duration::from_secs(600));
    });
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );

    let result = orchestrator.run().await;

    assert_eq!(result.errors["p1"].kind, FailureKind::RateLimited);
    assert!(result.fetched.is_empty());
}

#[tokio::test]
async fn test_cancellation_keeps_in_flight_work() {
    let catalog = pop_and_rock();
    let token = CancellationToken::new();
    catalog.with_state(|s| s.cancel_on_detail = Some(token.clone()));

    let config = SyncConfig::builder()
        .max_concurrent_workers(1)
        .build()
        .unwrap();
    let fetcher = PagedFetcher::new(Arc::clone(&catalog), config.clone())
        .with_cancellation(token.clone());
    let orchestrator = SyncOrchestrator::new(
        Arc::new(fetcher),
        Arc::new(InMemoryVersionStore::new()),
        config,
    )
    .unwrap();

    let result = orchestrator.run_with_cancellation(&token).await;

    assert!(result.cancelled);
    assert_eq!(result.fetched_ids(), ids(&["p1"]));
    assert!(result.skipped.is_empty());
    assert!(result.errors.is_empty());
    assert_eq!(catalog.total_detail_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_run_stops_paging_listings() {
    let catalog = MockCatalog::new();
    for i in 0..10 {
        let playlist_id = format!("p{}", i);
        catalog.set_category(&format!("c{}", i), &[(playlist_id.as_str(), "v1")]);
    }
    catalog.with_state(|s| s.top_level_page_size = 1);

    let token = CancellationToken::new();
    token.cancel();

    let config = test_config();
    let fetcher = PagedFetcher::new(Arc::clone(&catalog), config.clone())
        .with_cancellation(token.clone());
    let orchestrator = SyncOrchestrator::new(
        Arc::new(fetcher),
        Arc::new(InMemoryVersionStore::new()),
        config,
    )
    .unwrap();

    let result = orchestrator.run_with_cancellation(&token).await;

    assert!(result.cancelled);
    assert_eq!(result.total(), 0);
    assert_eq!(catalog.top_level_calls.load(Ordering::SeqCst), 0);
    assert_eq!(catalog.children_calls.load(Ordering::SeqCst), 0);
    assert_eq!(catalog.total_detail_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_run_without_fetcher_token_stops_paging() {
    let catalog = MockCatalog::new();
    for i in 0..10 {
        let playlist_id = format!("p{}", i);
        catalog.set_category(&format!("c{}", i), &[(playlist_id.as_str(), "v1")]);
    }
    catalog.with_state(|s| s.top_level_page_size = 1);
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );

    let token = CancellationToken::new();
    token.cancel();
    let result = orchestrator.run_with_cancellation(&token).await;

    assert!(result.cancelled);
    assert_eq!(catalog.top_level_calls.load(Ordering::SeqCst), 0);
    assert_eq!(catalog.total_detail_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fetcher_cancellation_marks_result_cancelled() {
    let catalog = pop_and_rock();
    catalog.with_state(|s| s.top_level_rate_limit = Some(Duration::from_secs(1)));

    let token = CancellationToken::new();
    let config = test_config();
    let fetcher = PagedFetcher::new(Arc::clone(&catalog), config.clone())
        .with_cancellation(token.clone());
    let orchestrator = SyncOrchestrator::new(
        Arc::new(fetcher),
        Arc::new(InMemoryVersionStore::new()),
        config,
    )
    .unwrap();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    // The run's own token is never cancelled; only the fetcher's is
    let result = orchestrator.run().await;

    assert!(result.cancelled);
    assert!(!result.is_clean());
    assert!(result.errors.is_empty());
    assert!(result.fetched.is_empty());
}

#[tokio::test]
async fn test_child_listed_twice_is_fetched_once() {
    let catalog = MockCatalog::new();
    catalog.set_category("pop", &[("p1", "v1"), ("p2", "v1")]);
    catalog.set_category("rock", &[("p1", "v1"), ("p3", "v1")]);
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );

    let result = orchestrator.run().await;

    assert_eq!(result.fetched_ids(), ids(&["p1", "p2", "p3"]));
    assert_eq!(catalog.detail_calls("p1"), 1);
    assert_eq!(result.total(), 3);
}

#[tokio::test]
async fn test_failed_put_still_reports_fetch() {
    let catalog = pop_and_rock();
    let store = Arc::new(FlakyStore::default());
    store.fail_puts.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator(&catalog, store.clone(), test_config());

    let first = orchestrator.run().await;
    assert_eq!(first.fetched_ids(), ids(&["p1", "p2", "p3"]));
    assert!(first.errors.is_empty());

    // Nothing was recorded, so everything is fetched again
    store.fail_puts.store(false, Ordering::SeqCst);
    let second = orchestrator.run().await;
    assert_eq!(second.fetched_ids(), ids(&["p1", "p2", "p3"]));
    assert_eq!(catalog.detail_calls("p1"), 2);
}

#[tokio::test]
async fn test_top_level_listing_failure() {
    let catalog = pop_and_rock();
    catalog.with_state(|s| s.top_level_fails = true);
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );

    let result = orchestrator.run().await;

    assert!(result.fetched.is_empty());
    assert_eq!(result.error_ids(), ids(&["root"]));
}

#[tokio::test]
async fn test_child_listing_failure_is_isolated() {
    let catalog = pop_and_rock();
    catalog.with_state(|s| {
        s.failing_listings.insert("rock".to_string());
    });
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );

    let result = orchestrator.run().await;

    assert_eq!(result.fetched_ids(), ids(&["p1", "p2"]));
    assert_eq!(result.error_ids(), ids(&["rock"]));
}

#[tokio::test]
async fn test_empty_token_is_always_fetched() {
    let catalog = MockCatalog::new();
    catalog.set_category("pop", &[("p1", "")]);
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );

    orchestrator.run().await;
    let second = orchestrator.run().await;

    assert_eq!(second.fetched_ids(), ids(&["p1"]));
    assert_eq!(catalog.detail_calls("p1"), 2);
}

#[tokio::test]
async fn test_children_are_paginated() {
    let catalog = MockCatalog::new();
    let playlists: Vec<(String, String)> = (0..7)
        .map(|i| (format!("p{}", i), "v1".to_string()))
        .collect();
    let refs: Vec<(&str, &str)> = playlists
        .iter()
        .map(|(id, token)| (id.as_str(), token.as_str()))
        .collect();
    catalog.set_category("pop", &refs);
    catalog.with_state(|s| s.page_size = 3);

    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );
    let result = orchestrator.run().await;

    assert_eq!(result.fetched.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_worker_count_is_bounded() {
    let catalog = MockCatalog::new();
    for category in ["a", "b", "c", "d"] {
        let playlist = format!("{}-1", category);
        catalog.set_category(category, &[(playlist.as_str(), "v1")]);
    }
    catalog.with_state(|s| s.detail_delay = Some(Duration::from_millis(100)));

    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    );
    let result = orchestrator.run().await;

    assert_eq!(result.fetched.len(), 4);
    assert_eq!(catalog.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_events_are_published() {
    let catalog = pop_and_rock();
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let orchestrator = orchestrator(
        &catalog,
        Arc::new(InMemoryVersionStore::new()),
        test_config(),
    )
    .with_event_bus(bus);

    orchestrator.run().await;

    let mut received = Vec::new();
    while let Ok(CoreEvent::Sync(event)) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(received.first(), Some(SyncEvent::Started { .. })));
    assert!(matches!(
        received.last(),
        Some(SyncEvent::Completed { fetched: 3, skipped: 0, failed: 0, .. })
    ));
    let fetched = received
        .iter()
        .filter(|e| matches!(e, SyncEvent::EntityFetched { .. }))
        .count();
    assert_eq!(fetched, 3);
}

#[tokio::test]
async fn test_synced_at_comes_from_clock() {
    let catalog = pop_and_rock();
    let store = Arc::new(InMemoryVersionStore::new());
    let pinned = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
    let orchestrator = orchestrator(&catalog, store.clone(), test_config())
        .with_clock(Arc::new(ManualClock::new(pinned)));

    orchestrator.run().await;

    let record = store.get("p2").await.unwrap().unwrap();
    assert_eq!(record.last_synced_at, pinned);
}

#[tokio::test]
async fn test_json_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("versions.json");
    let catalog = pop_and_rock();

    let store = Arc::new(JsonFileVersionStore::open(&path).await.unwrap());
    orchestrator(&catalog, store, test_config()).run().await;

    let reopened = Arc::new(JsonFileVersionStore::open(&path).await.unwrap());
    let result = orchestrator(&catalog, reopened, test_config()).run().await;

    assert!(result.fetched.is_empty());
    assert_eq!(result.skipped, ids(&["p1", "p2", "p3"]));
}

#[tokio::test]
async fn test_sqlite_store_drives_change_detection() {
    let store = Arc::new(SqliteVersionStore::connect("sqlite::memory:").await.unwrap());
    let catalog = pop_and_rock();
    let orchestrator = orchestrator(&catalog, store.clone(), test_config());

    orchestrator.run().await;
    catalog.set_category("rock", &[("p3", "v2")]);
    let result = orchestrator.run().await;

    assert_eq!(result.fetched_ids(), ids(&["p3"]));
    assert_eq!(result.skipped, ids(&["p1", "p2"]));
    assert!(store.matches("p3", "v2").await.unwrap());
}
