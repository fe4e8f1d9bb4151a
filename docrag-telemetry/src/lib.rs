//! # docrag-telemetry
//!
//! Logging setup for binaries built on `docrag`, plus an in-memory layer that
//! captures the spans of each `rag.query` for inspection.
//!
//! ```rust,ignore
//! docrag_telemetry::init_telemetry("my-service")?;
//! ```
//!
//! The log filter comes from `RUST_LOG` and defaults to `info`. Set
//! `DOCRAG_LOG_FORMAT=json` for one JSON object per line.

pub mod capture;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub use capture::{CapturedEvent, CapturedSpan, QueryTraceLayer, QueryTraceStorage};

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "DOCRAG_LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    /// A global subscriber is already installed; the existing one stays active.
    #[error("telemetry already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read [`LOG_FORMAT_ENV`]; anything other than `json` selects `Pretty`.
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn install(
    filter: EnvFilter,
    format: LogFormat,
    capture: Option<QueryTraceLayer>,
) -> Result<(), TelemetryError> {
    let json = (format == LogFormat::Json).then(|| fmt::layer().json().with_current_span(true));
    let pretty = (format == LogFormat::Pretty).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(capture)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}

/// Install the global subscriber with the `RUST_LOG` filter.
///
/// Calling this more than once leaves the first subscriber in place and
/// returns [`TelemetryError::AlreadyInitialized`].
pub fn init_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    install(env_filter(), LogFormat::from_env(), None)?;
    tracing::info!(service.name = service_name, "telemetry initialized");
    Ok(())
}

/// Install the global subscriber with an explicit filter directive such as
/// `"docrag=debug,warn"`.
pub fn init_with_filter(filter: &str) -> Result<(), TelemetryError> {
    let parsed = EnvFilter::try_new(filter).map_err(|e| TelemetryError::Filter {
        filter: filter.to_string(),
        message: e.to_string(),
    })?;
    install(parsed, LogFormat::from_env(), None)
}

/// Install the global subscriber and also capture query traces into `storage`.
pub fn init_with_capture(
    service_name: &str,
    storage: Arc<QueryTraceStorage>,
) -> Result<(), TelemetryError> {
    install(env_filter(), LogFormat::from_env(), Some(QueryTraceLayer::new(storage)))?;
    tracing::info!(service.name = service_name, "telemetry initialized with query capture");
    Ok(())
}
