//! NinjaCape MQTT bridge - main entry point

use clap::{Parser, Subcommand};
use ninjacape_bridge::config::BridgeConfig;
use ninjacape_bridge::observability::init_default_logging;
use ninjacape_bridge::Supervisor;
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tracing::{error, info};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config.toml",
    "config.json",
    "/etc/ninjacape-bridge/config.toml",
];

/// Bridge between a Ninja Cape and an MQTT broker
#[derive(Parser)]
#[command(name = "ninjacape-bridge")]
#[command(about = "Bridge a Ninja Cape serial device to an MQTT broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!("Starting NinjaCape MQTT bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: Option<&Path>) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(BridgeConfig::load_from_file(path)?);
        }
    }

    Err(format!(
        "No configuration file found. Provide one with -c/--config or create one of: {}",
        DEFAULT_CONFIG_PATHS.join(", ")
    )
    .into())
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
    };

    let supervisor = Supervisor::new(config);
    supervisor.run(shutdown).await?;
    Ok(())
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", config.to_masked_toml()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
