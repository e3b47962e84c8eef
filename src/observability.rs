//! Logging setup and span helpers for the reconciliation worker.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::dispatch::TaskEnvelope;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable multi-line output.
    #[default]
    Pretty,
}

/// Installs the global subscriber.
///
/// Levels come from `RUST_LOG` and default to `info`. Only the first call has
/// an effect.
///
/// ```rust
/// use snapenv::observability::{LogFormat, init_logging};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        match format {
            LogFormat::Json => registry.with(fmt::layer().json()).init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
        }
    });
}

/// Creates the span one task execution runs in.
#[must_use]
pub fn task_span(envelope: &TaskEnvelope) -> Span {
    tracing::info_span!(
        "task",
        task_id = %envelope.id,
        kind = %envelope.kind(),
        attempt = envelope.attempt,
        pr_id = %envelope.task.pr_id(),
    )
}
