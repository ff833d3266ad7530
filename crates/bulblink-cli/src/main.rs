//! bulblink - control a BLE smart bulb from the command line

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use bulblink_ble::{AdapterPermission, BtleplugTransport};
use bulblink_cli::{
    cli::{Cli, Commands},
    commands::{handle_config, CommandDispatcher},
    config::AppConfig,
    error::Result,
};
use bulblink_core::BulbController;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref().map(Path::new))?;
    debug!("Effective configuration: {:?}", config);

    // Printing the configuration needs no adapter
    if let Commands::Config { write } = &cli.command {
        return handle_config(&config, write.as_deref().map(Path::new));
    }

    let transport = BtleplugTransport::new(config.ble.clone()).await?;
    let controller = BulbController::new(
        Arc::new(transport),
        AdapterPermission,
        config.controller_config(),
    );

    CommandDispatcher::new(controller, config)
        .execute(cli.command)
        .await
}

/// Setup logging based on verbosity level; `RUST_LOG` takes precedence
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
