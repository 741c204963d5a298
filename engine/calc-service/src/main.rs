//! Calc Exchange Production Service
//!
//! Main entry point for the calculation service. Loads configuration, opens
//! the history ledger, serves HTTP and WebSocket traffic and shuts down
//! gracefully on Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use calc_service::{
    initialize_logging, load_configuration, monitoring, setup_signal_handlers, wait_for_shutdown,
    ServiceConfig, ServiceState,
};

#[derive(Parser)]
#[command(name = "calc-server")]
#[command(about = "Calculation service with a live history feed")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to $CALC_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the history file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Evaluator program
    #[arg(long)]
    evaluator: Option<String>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(data_dir) = &self.data_dir {
            config.ledger.data_dir = data_dir.clone();
        }
        if let Some(evaluator) = &self.evaluator {
            config.evaluator.program = evaluator.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let args = Args::parse();

    // Load configuration
    let mut config = load_configuration(args.config.as_deref())?;
    args.apply(&mut config);
    calc_service::config::validate_config(&config).context("Invalid command-line overrides")?;

    if let Some(path) = &args.dump_config {
        config.save_to_file(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = initialize_logging(&config.logging)?;

    info!("Starting Calc Service v{}", env!("CARGO_PKG_VERSION"));

    monitoring::install_exporter(&config.metrics)?;

    // Create service state
    let service_state = ServiceState::new(config)?;
    info!("Service state initialized");

    // Setup signal handlers for graceful shutdown
    let shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    service_state.run(wait_for_shutdown(shutdown_signal)).await?;

    info!("Calc Service shutdown complete");
    Ok(())
}
