//! # Fetcher
//!
//! Retrieves top-level listings, per-parent child listings, and per-entity
//! details from an upstream catalog.
//!
//! Upstream connectors implement the page-level [`CatalogSource`]. The
//! [`PagedFetcher`] turns those pages into lazy streams and routes every
//! underlying call through one [`CallExecutor`], so the request budget,
//! retry-after handling and backoff apply uniformly.

use crate::models::{ChildEntity, DetailPage, EntityDetail, Page, TopLevelEntity};
use crate::rate_limiter::RateLimiter;
use crate::retry::{CallExecutor, SourceError};
use crate::{Result, SyncError};
use async_trait::async_trait;
use core_runtime::SyncConfig;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Entity id that failures of the top-level listing are attributed to
pub const ROOT_ENTITY_ID: &str = "root";

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Page-level access to an upstream catalog.
///
/// Each method is exactly one upstream request. Cursors are opaque to the
/// caller; `None` asks for the first page.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn top_level_page(&self, cursor: Option<String>) -> SourceResult<Page<TopLevelEntity>>;

    async fn children_page(
        &self,
        parent_id: &str,
        cursor: Option<String>,
    ) -> SourceResult<Page<ChildEntity>>;

    async fn detail_page(&self, entity_id: &str, cursor: Option<String>)
        -> SourceResult<DetailPage>;
}

#[async_trait]
impl<S: CatalogSource + ?Sized> CatalogSource for Arc<S> {
    async fn top_level_page(&self, cursor: Option<String>) -> SourceResult<Page<TopLevelEntity>> {
        (**self).top_level_page(cursor).await
    }

    async fn children_page(
        &self,
        parent_id: &str,
        cursor: Option<String>,
    ) -> SourceResult<Page<ChildEntity>> {
        (**self).children_page(parent_id, cursor).await
    }

    async fn detail_page(
        &self,
        entity_id: &str,
        cursor: Option<String>,
    ) -> SourceResult<DetailPage> {
        (**self).detail_page(entity_id, cursor).await
    }
}

/// Listing and detail retrieval as seen by the orchestrator.
///
/// Listings are lazy, finite and restartable: every call starts a fresh
/// walk from the first page.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn list_top_level(&self) -> BoxStream<'_, Result<TopLevelEntity>>;

    fn list_children<'a>(&'a self, parent_id: &'a str) -> BoxStream<'a, Result<ChildEntity>>;

    async fn fetch_detail(&self, entity_id: &str) -> Result<EntityDetail>;
}

/// [`Fetcher`] over a [`CatalogSource`] with a shared request budget
pub struct PagedFetcher<S> {
    source: S,
    executor: CallExecutor,
}

impl<S: CatalogSource> PagedFetcher<S> {
    /// Create a fetcher with its own budget sized from `config`
    pub fn new(source: S, config: SyncConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.max_requests_per_window,
            config.window_duration,
        ));
        Self::with_limiter(source, config, limiter)
    }

    /// Create a fetcher drawing from an existing budget
    pub fn with_limiter(source: S, config: SyncConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            source,
            executor: CallExecutor::new(limiter, config),
        }
    }

    /// Make listing waits observe `cancel`.
    ///
    /// Pass the same token given to the orchestrator's run so that budget and
    /// retry waits between pages stop promptly.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(cancel);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.executor.limiter()
    }

    async fn top_level_page(&self, cursor: Option<String>) -> Result<Page<TopLevelEntity>> {
        self.executor
            .call(ROOT_ENTITY_ID, true, || {
                self.source.top_level_page(cursor.clone())
            })
            .await
    }

    async fn children_page(
        &self,
        parent_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<ChildEntity>> {
        self.executor
            .call(parent_id, true, || {
                self.source.children_page(parent_id, cursor.clone())
            })
            .await
    }
}

#[async_trait]
impl<S: CatalogSource> Fetcher for PagedFetcher<S> {
    fn list_top_level(&self) -> BoxStream<'_, Result<TopLevelEntity>> {
        paginate(ROOT_ENTITY_ID.to_string(), move |cursor| {
            self.top_level_page(cursor)
        })
    }

    fn list_children<'a>(&'a self, parent_id: &'a str) -> BoxStream<'a, Result<ChildEntity>> {
        paginate(parent_id.to_string(), move |cursor| {
            self.children_page(parent_id, cursor)
        })
    }

    #[instrument(skip(self))]
    async fn fetch_detail(&self, entity_id: &str) -> Result<EntityDetail> {
        let mut detail = EntityDetail::default();
        let mut lists: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .executor
                .call(entity_id, false, || {
                    self.source.detail_page(entity_id, cursor.clone())
                })
                .await?;
            pages += 1;

            if pages == 1 {
                detail.version_token = page.version_token;
                detail.attributes = page.attributes;
            } else {
                for (key, value) in page.attributes {
                    detail.attributes.entry(key).or_insert(value);
                }
            }

            for (key, values) in page.lists {
                lists.entry(key).or_default().extend(values);
            }

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                Some(next) => {
                    warn!(entity_id, cursor = %next, "Detail cursor did not advance, stopping");
                    break;
                }
                None => break,
            }
        }

        for (key, values) in lists {
            detail.attributes.insert(key, join_unique(values));
        }

        debug!(entity_id, pages, "Fetched entity detail");
        Ok(detail)
    }
}

/// Comma-join values, keeping the first occurrence of each
fn join_unique(values: Vec<String>) -> String {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect::<Vec<_>>()
        .join(",")
}

enum Cursor {
    First,
    Next(String),
    Exhausted,
}

/// Lazily walk a cursor-paginated listing.
///
/// Pages are requested only as the stream is polled. The stream ends after
/// the last page, after the first error, or when a page repeats its cursor.
fn paginate<'a, T, F, Fut>(scope: String, fetch_page: F) -> BoxStream<'a, Result<T>>
where
    T: Send + 'a,
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    stream::try_unfold(
        (Cursor::First, fetch_page),
        move |(cursor, fetch_page)| {
            let scope = scope.clone();
            async move {
                let current = match cursor {
                    Cursor::First => None,
                    Cursor::Next(cursor) => Some(cursor),
                    Cursor::Exhausted => return Ok(None),
                };

                let page = fetch_page(current.clone()).await?;
                debug!(scope = %scope, items = page.items.len(), "Fetched listing page");

                let next = match page.next_cursor {
                    Some(next) if current.as_deref() == Some(next.as_str()) => {
                        warn!(
                            scope = %scope,
                            cursor = %next,
                            "Listing cursor did not advance, stopping"
                        );
                        Cursor::Exhausted
                    }
                    Some(next) => Cursor::Next(next),
                    None => Cursor::Exhausted,
                };

                let items = stream::iter(page.items.into_iter().map(Ok::<T, SyncError>));
                Ok::<_, SyncError>(Some((items, (next, fetch_page))))
            }
        },
    )
    .try_flatten()
    .boxed()
}
