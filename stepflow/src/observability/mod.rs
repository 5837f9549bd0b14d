//! Observability utilities.
//!
//! The engine only emits `tracing` events and spans; installing a subscriber
//! is left to the application. [`init_tracing`] is a convenience for binaries
//! and tests that want the usual setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const ENV_LOG: &str = "STEPFLOW_LOG";

/// Filter used when [`ENV_LOG`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Builds the filter from [`ENV_LOG`], falling back to [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a global subscriber.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let pretty = (format == LogFormat::Pretty).then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(pretty)
        .with(json)
        .try_init()
        .is_ok()
}
