//! Main entry point for the geodata-fetch CLI

use clap::Parser;
use geodata_fetch::cli::{Cli, Commands};
use geodata_fetch::metrics;
use geodata_fetch::shutdown::ShutdownCoordinator;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("geodata_fetch=info"));

    // Logs go to stderr so `--output-format json` keeps stdout parseable.
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr) {
            error!("Metrics disabled: {}", e);
        }
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - cancelling remaining tasks");
                shutdown.request_shutdown();
            }
        }
    });

    let result = match &cli.command {
        Commands::Search(args) => args.execute(&cli, shutdown.clone()).await,
        Commands::Era5(args) => args.execute(&cli, shutdown.clone()).await,
        Commands::Plan(args) => args.execute_plan(&cli),
        Commands::Soilgrids(args) => args.execute(&cli, shutdown.clone()).await,
    }
    .map_err(|e| anyhow::anyhow!(e));

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
