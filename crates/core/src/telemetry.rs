//! Tracing subscriber configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryConfig;
use crate::{Error, Result};

const DEFAULT_FILTER: &str = "info,deep_research=debug";

/// Install the global tracing subscriber: an env filter plus a stdout fmt layer,
/// JSON-formatted when `json_logs` is set.
pub fn configure_tracing(config: &TelemetryConfig) -> Result<()> {
    let directives = config
        .filter
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_FILTER.into());
    let env_filter = tracing_subscriber::EnvFilter::new(directives);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))
}
