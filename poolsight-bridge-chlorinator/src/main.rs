//! PoolSight bridge for salt-water chlorinator controllers.
//!
//! Polls the controller over Modbus and publishes readings to MQTT or Zenoh.

use anyhow::{Context, Result};
use clap::Parser;
use poolsight_bridge_chlorinator::config::ChlorinatorBridgeConfig;
use poolsight_bridge_chlorinator::transport::ModbusTransport;
use poolsight_bridge_chlorinator::{BridgeError, Controller, Transport};
use poolsight_common::LoggingConfig;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};

/// PoolSight bridge for salt-water chlorinators (Modbus RTU/TCP).
#[derive(Parser, Debug)]
#[command(name = "poolsight-bridge-chlorinator")]
#[command(about = "Polls a chlorinator controller and publishes its readings")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "chlorinator.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = ChlorinatorBridgeConfig::load_from_file(&args.config)
        .map_err(BridgeError::Config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    poolsight_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting poolsight-bridge-chlorinator");
    info!("Loaded configuration from {:?}", args.config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    let transport: Box<dyn Transport> = Box::new(
        ModbusTransport::connect(&config.device)
            .await
            .map_err(BridgeError::Connect)
            .with_context(|| format!("Failed to open device '{}'", config.device.name))?,
    );
    info!("Modbus connection established");

    let sink_config = config.sink.clone();
    let mut controller = Controller::new(config);
    let summary = controller
        .run(
            transport,
            || async move { poolsight_common::sink::open(&sink_config).await },
            shutdown_rx,
        )
        .await?;

    info!(
        cycles = summary.stats.cycles,
        published = summary.stats.published,
        "Chlorinator bridge stopped"
    );

    Ok(())
}
