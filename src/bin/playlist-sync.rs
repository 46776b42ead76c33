//! One-shot playlist sync against the Spotify Web API.
//!
//! Environment:
//! - `SPOTIFY_ACCESS_TOKEN`: bearer token (required)
//! - `PLAYLIST_SYNC_CATEGORIES`: comma-separated category ids; all browse
//!   categories when unset
//! - `PLAYLIST_SYNC_COUNTRY`: market for category endpoints
//! - `PLAYLIST_SYNC_API_BASE`: Web API root, default `https://api.spotify.com/v1`
//! - `PLAYLIST_SYNC_DATABASE_URL`: version store, default `sqlite://playlist-sync.db`
//! - `PLAYLIST_SYNC_LOG_FORMAT` / `PLAYLIST_SYNC_LOG_LEVEL` / `RUST_LOG`
//! - `PLAYLIST_SYNC_*` tunables read by `SyncConfig::from_env`
//!
//! Fetched playlists are written to stdout as JSON lines. The process exits
//! with status 1 when any entity failed or the run was interrupted.

use anyhow::Context;
use bridge_desktop::ReqwestHttpClient;
use core_runtime::logging::{init_logging, LoggingConfig};
use core_sync::{PagedFetcher, SqliteVersionStore, SyncConfig, SyncOrchestrator, SyncResult};
use provider_spotify::SpotifyConnector;
use std::env;
use std::io::{self, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://playlist-sync.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::from_env()?)?;

    let config = SyncConfig::from_env().context("invalid sync configuration")?;
    let access_token =
        env::var("SPOTIFY_ACCESS_TOKEN").context("SPOTIFY_ACCESS_TOKEN must be set")?;
    let database_url =
        env::var("PLAYLIST_SYNC_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

    let http_client = Arc::new(ReqwestHttpClient::with_timeout(config.request_timeout)?);
    let mut connector = SpotifyConnector::new(http_client, access_token)
        .with_page_size(config.page_size)
        .with_request_timeout(config.request_timeout);

    if let Some(categories) = category_ids() {
        info!(categories = ?categories, "Restricting sync to configured categories");
        connector = connector.with_categories(categories);
    }
    if let Ok(country) = env::var("PLAYLIST_SYNC_COUNTRY") {
        connector = connector.with_country(country);
    }
    if let Ok(api_base) = env::var("PLAYLIST_SYNC_API_BASE") {
        connector = connector.with_api_base(api_base);
    }

    let cancel = CancellationToken::new();
    let fetcher = PagedFetcher::new(connector, config.clone()).with_cancellation(cancel.clone());
    let store = SqliteVersionStore::connect(&database_url)
        .await
        .with_context(|| format!("failed to open version store at {}", database_url))?;
    let orchestrator = SyncOrchestrator::new(Arc::new(fetcher), Arc::new(store), config)?;

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight playlists");
            interrupt.cancel();
        }
    });

    let result = orchestrator.run_with_cancellation(&cancel).await;

    write_fetched(&result).context("failed to write fetched playlists")?;
    report(&result);

    if !result.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn category_ids() -> Option<Vec<String>> {
    let raw = env::var("PLAYLIST_SYNC_CATEGORIES").ok()?;
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();

    (!ids.is_empty()).then_some(ids)
}

fn write_fetched(result: &SyncResult) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for entity in result.fetched.values() {
        serde_json::to_writer(&mut out, entity)?;
        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}

fn report(result: &SyncResult) {
    for (entity_id, failure) in &result.errors {
        error!(
            entity_id = %entity_id,
            kind = ?failure.kind,
            message = %failure.message,
            "Playlist not synced"
        );
    }

    info!(
        run_id = %result.run_id,
        fetched = result.fetched.len(),
        skipped = result.skipped.len(),
        failed = result.errors.len(),
        cancelled = result.cancelled,
        "Sync summary"
    );
}
