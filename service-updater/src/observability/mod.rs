//! Tracing subscriber setup and batch spans.

use serde::{Deserialize, Serialize};
use tracing::{info_span, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::UpdaterError;
use crate::pipeline::BatchRun;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "service_updater=info,warn";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single lines.
    #[default]
    Compact,
    /// One JSON object per event, with span fields.
    Json,
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over [`DEFAULT_FILTER`]. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), UpdaterError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
    };
    result.map_err(|e| UpdaterError::Internal(format!("failed to install tracing subscriber: {e}")))
}

/// Span covering one batch; every log line inside carries the run id and mode.
#[must_use]
pub fn batch_span(run: &BatchRun) -> Span {
    info_span!(
        "batch",
        run_id = %run.run_id,
        mode = %run.mode,
        entities = run.entities.len()
    )
}
