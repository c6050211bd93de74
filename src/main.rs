//! Fleet Sentinel - vehicle telemetry alerting service
//!
//! Reads device messages (JSON lines), routes them through the event router,
//! and evaluates alert rules per vehicle.
//!
//! # Usage
//!
//! ```bash
//! # Live simulated fleet
//! simulation --vehicles 5 --ticks 600 | fleet-sentinel --stdin
//!
//! # Replay a recorded message file
//! fleet-sentinel --file messages.jsonl --config fleet_config.toml
//! ```
//!
//! # Environment Variables
//!
//! - `FLEET_CONFIG`: Path to the TOML config (default: `./fleet_config.toml`)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleet_sentinel::pipeline::{FileSource, MessageSource, PipelineCoordinator, ProcessingLoop, StdinSource};
use fleet_sentinel::{EventRouter, FleetConfig, InMemoryAlertStore, StaticAssetDirectory};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fleet-sentinel")]
#[command(about = "Vehicle telemetry routing and edge-triggered fleet alerting")]
#[command(version)]
struct CliArgs {
    /// Read device messages from stdin (JSON lines)
    /// Use with the simulator: simulation | fleet-sentinel --stdin
    #[arg(long, conflicts_with = "file")]
    stdin: bool,

    /// Read device messages from a JSON-lines file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Config file (overrides FLEET_CONFIG and ./fleet_config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = match &args.config {
        Some(path) => FleetConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FleetConfig::load(),
    };

    if args.dump_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Fleet Sentinel - telemetry alerting");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Vehicle device type: {} | Assets: {} | Channel capacity: {}{}",
        config.transport.vehicle_device_type,
        config.assets.len(),
        config.pipeline.channel_capacity,
        if config.pipeline.drop_when_full { " (drop when full)" } else { "" }
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    if let Some(path) = &args.file {
        info!("📥 Input: file {}", path.display());
        let source = FileSource::open(path).await?;
        run_pipeline(&config, source, cancel_token).await?;
    } else {
        if !args.stdin {
            info!("No input selected, defaulting to stdin");
        }
        info!("📥 Input: stdin (JSON-lines device messages)");
        run_pipeline(&config, StdinSource::new(), cancel_token).await?;
    }

    info!("✓ Fleet Sentinel shutdown complete");
    Ok(())
}

async fn run_pipeline<S: MessageSource>(
    config: &FleetConfig,
    mut source: S,
    cancel_token: CancellationToken,
) -> Result<()> {
    let directory = Arc::new(StaticAssetDirectory::from_config(&config.assets));
    let store = Arc::new(InMemoryAlertStore::new());
    let router = Arc::new(EventRouter::new());

    let pipeline = PipelineCoordinator::from_config(config, directory, store.clone())
        .attach(&router, config.pipeline.channel_capacity)?;

    let stats = ProcessingLoop::new(Arc::clone(&router), pipeline, cancel_token)
        .drop_when_full(config.pipeline.drop_when_full)
        .run(&mut source)
        .await;
    info!("{}", stats);

    let open = store.open_count()?;
    info!("Open alerts at shutdown: {}", open);
    Ok(())
}
