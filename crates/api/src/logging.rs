//! Tracing subscriber setup

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use crate::settings::LoggingSettings;

/// Install the global subscriber; `RUST_LOG` overrides the configured level
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("failed to initialize logging: {}", e))
}
