//! DCA bot entry point.
//!
//! Runs against the in-memory paper venue; a live venue adapter plugs in
//! through the same `Venue` trait.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dca_bot::{guard_venue, AppConfig, Coordinator};
use dca_core::Price;
use dca_venue::{DynVenue, PaperVenue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// DCA bot with a managed take-profit ladder
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DCA_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dca_telemetry::init_logging()?;

    info!("Starting DCA bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > DCA_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("DCA_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::load(&config_path)?;
    info!(
        symbol = %config.symbol(),
        category = %config.category,
        interval_secs = config.interval_secs,
        "Configuration loaded"
    );

    let stop = CancellationToken::new();
    let io_cancel = CancellationToken::new();

    let paper: DynVenue = Arc::new(PaperVenue::new(
        config.symbol(),
        Price::new(config.paper.initial_price),
        config.paper.quote_balance,
    ));
    let (venue, recovery) = guard_venue(&config, paper, io_cancel.clone());
    let coordinator = Coordinator::new(config, venue, recovery, stop.clone(), io_cancel)?;

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_stop.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let outcome = coordinator.run().await?;
    info!(?outcome, "DCA bot stopped");

    match dca_telemetry::Metrics::render() {
        Ok(text) => debug!(metrics = %text, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to render metrics"),
    }

    Ok(())
}
