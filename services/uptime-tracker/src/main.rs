//! Uptime Tracker CLI
//!
//! Command-line interface for the container uptime tracking service.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use uptime_tracker::{load_config, Config};

#[derive(Parser)]
#[command(name = "uptime-tracker")]
#[command(about = "Container liveness sampling and uptime history service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API server port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, port={:?}, log_level={:?}",
        args.config,
        args.port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Starting uptime tracker");
    tracing::debug!(
        "Workloads: {}, max age: {} days, cache TTL: {:?}",
        config.workloads.len(),
        config.retention.max_age_days,
        config.polling.cache_ttl
    );

    uptime_tracker::run(config).await?;

    Ok(())
}
