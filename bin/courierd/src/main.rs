//! ---
//! trk_section: "01-core-functionality"
//! trk_subsection: "binary"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Binary entrypoint for the CourierLive daemon."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use courier_common::config::AppConfig;
use courier_common::logging::init_tracing;
use courier_net::{ApiServerBuilder, HubMetrics, OrderStore, UpdateHub};
use prometheus::Registry;
use tokio::signal;
use tracing::{info, warn};

/// Broadcast capacity of the order update hub. Slow channel consumers
/// drop frames past this backlog instead of blocking the feed.
const HUB_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(author, version, about = "CourierLive daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the order API and update channel server")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/courier.toml"));
    candidates.push(PathBuf::from("configs/courier.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("courierd", &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::CheckConfig => {
            info!("configuration is valid");
            Ok(())
        }
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    if !config.api.enabled {
        warn!("api server disabled by configuration; nothing to run");
        return Ok(());
    }

    let registry = Arc::new(Registry::new());
    let metrics = HubMetrics::register(&registry)?;
    let hub = UpdateHub::new(HUB_CAPACITY, Arc::new(metrics));
    let store = Arc::new(OrderStore::new());

    let mut builder = ApiServerBuilder::new(config.api.listen, store, hub);
    if config.metrics.enabled {
        builder = builder.with_metrics_registry(registry);
    } else {
        info!("metrics endpoint disabled by configuration");
    }
    let server = builder.spawn().await?;
    info!(address = %server.local_addr(), "courierd running");

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    server.shutdown().await?;
    info!("courierd stopped");
    Ok(())
}
