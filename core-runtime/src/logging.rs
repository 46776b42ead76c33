//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with the `tracing` crate, supporting:
//! - JSON, pretty-print and compact output formats
//! - Module-level filtering through `EnvFilter`
//! - Span contexts so every log line carries the run and entity it belongs to
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::from_env()?.with_format(LogFormat::Json);
//! init_logging(config)?;
//! tracing::info!("Sync starting");
//! ```
//!
//! Access tokens are never passed to `tracing` macros; connectors skip them in
//! `#[instrument]` attributes.

use crate::error::{Error, Result};
use bridge_traits::time::LogLevel;
use std::io;
use tracing_subscriber::{
    filter::EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Crates whose log level follows the configured level; everything else is
/// pinned to `warn` by the default filter.
const WORKSPACE_TARGETS: &[&str] = &[
    "playlist_sync",
    "core_runtime",
    "core_sync",
    "provider_spotify",
    "bridge_desktop",
];

/// Output format. Scheduled runs usually want `Json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line, fields flattened
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Subscriber settings for one process
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to the workspace crates when no `filter` is set
    pub level: LogLevel,
    /// Full `EnvFilter` directive string, e.g. `core_sync=debug,sqlx=info`
    pub filter: Option<String>,
    /// Attach span context (run, entity) to each line
    pub enable_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: true,
        }
    }
}

impl LoggingConfig {
    /// Defaults overlaid with `PLAYLIST_SYNC_LOG_FORMAT`,
    /// `PLAYLIST_SYNC_LOG_LEVEL` and `RUST_LOG`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(format) = lookup("PLAYLIST_SYNC_LOG_FORMAT") {
            config.format = format.parse()?;
        }
        if let Some(level) = lookup("PLAYLIST_SYNC_LOG_LEVEL") {
            config.level = level
                .parse()
                .map_err(|e| Error::Config(format!("PLAYLIST_SYNC_LOG_LEVEL: {}", e)))?;
        }
        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            config.filter = Some(filter);
        }

        Ok(config)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }
}

/// Install the global subscriber. Call once per process.
///
/// # Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - The filter string is invalid
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let installed = match config.format {
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_span_events(if config.enable_spans {
                    FmtSpan::CLOSE
                } else {
                    FmtSpan::NONE
                })
                .with_writer(io::stderr);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(config.enable_spans)
                .with_span_list(config.enable_spans)
                .with_writer(io::stderr);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
    };
    installed.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(format = ?config.format, level = config.level.as_str(), "Logging initialized");
    Ok(())
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(filter_directives(config))
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn filter_directives(config: &LoggingConfig) -> String {
    if let Some(custom_filter) = &config.filter {
        return custom_filter.clone();
    }

    // Our crates at the configured level, dependencies at warn
    let level = config.level.as_str();
    let mut directives: Vec<String> = WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    directives.extend(
        ["h2=warn", "hyper=warn", "reqwest=warn", "sqlx=warn"]
            .iter()
            .map(|d| d.to_string()),
    );
    directives.join(",")
}
