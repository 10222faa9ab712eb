//! Driver Fatigue Monitor - Main Entry Point

use api::logging::init_logging;
use api::settings::Settings;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("=== Driver Fatigue Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    api::run(settings).await
}
