//! PeerChat CLI entry point

use clap::Parser;
use tracing::{error, info};

use peerchat_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Configuration decides the log level, so it is loaded first
    let mut config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Override download directory if specified
    if let Some(dir) = &cli.download_dir {
        config.peerchat.downloads.dir = Some(dir.into());
    }

    setup_logging(cli.verbose || config.cli.verbose);

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("PeerChat CLI exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from the given file or from the standard layers
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}
