//! Signal Screener - equity analysis and screening service.
//!
//! Serves single-symbol analysis, cached universe screens, daily
//! recommendations and sized trading plans over HTTP.

use anyhow::Result;
use signal_common::config::Config;
use signal_common::logging::init_logging;
use signal_screener::ScreenerService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    let config = Config::load_and_validate()?;

    init_logging(&config.observability);

    tracing::info!("Signal Screener v{}", env!("CARGO_PKG_VERSION"));

    let service = ScreenerService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
