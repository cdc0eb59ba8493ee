use anyhow::Result;
use log::error;
use std::time::Duration;
use tokio::sync::broadcast;

use meterlink::options::Options;
use meterlink::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    let config = Config::new(options.config_file.clone()).unwrap_or_else(|err| {
        meterlink::init_logging("info");
        error!("Failed to load config {}: {:?}", options.config_file, err);
        std::process::exit(255);
    });

    // Create a channel for shutdown signaling
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        if let Err(e) = shutdown_tx_clone.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    });

    let runtime = options.runtime.map(Duration::from_secs);
    if let Err(e) = meterlink::app(shutdown_rx, config, runtime).await {
        error!("Application error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
