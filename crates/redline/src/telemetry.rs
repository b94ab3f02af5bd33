//! Tracing initialisation for hosts embedding the crate.
//!
//! Bridges `log` records into `tracing` and installs a fmt subscriber with
//! an env-filter (`RUST_LOG`, falling back to the given default directive).

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::TelemetryError;

/// Initialises the global tracing subscriber. Call once, early.
pub fn init_tracing(default_directive: &str) -> Result<(), TelemetryError> {
    tracing_log::LogTracer::init().map_err(|e| TelemetryError::LogBridge(e.to_string()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError::SetSubscriber(e.to_string()))
}
