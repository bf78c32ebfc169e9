//! Sniperbot entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use sniperbot::chain_adapters::{StubChainClient, StubSigner};
use sniperbot::config::BotConfig;
use sniperbot::{init_logging, metric, version, AppState};

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/sniperbot.json")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand)]
enum Commands {
    /// Generate default configuration
    Init,

    /// Run the bot
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;
    println!("{} starting up", version::full_version());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => init_config(&cli.config),
        Commands::Run => run_bot(&cli.config).await,
    }
}

/// Write a default configuration file.
fn init_config(path: &str) -> Result<()> {
    let config = BotConfig::default();
    config.save(path)?;
    info!("default configuration written to {}", path);
    info!("edit it and start the bot with `sniperbot run`");
    Ok(())
}

/// Run the bot against the configured collaborators.
async fn run_bot(path: &str) -> Result<()> {
    let mut config = BotConfig::load(path)
        .with_context(|| format!("could not load configuration from {path}"))?;

    // The binary ships with inert collaborator stubs; a live deployment
    // injects real chain/signing clients through the library API. With
    // stubs, anything but simulation mode would just submit into a wall.
    if !config.trading.simulation_mode {
        warn!("no live collaborators wired, forcing simulation mode");
        config.trading.simulation_mode = true;
    }

    metric::init_metrics(config.general.enable_metrics)?;

    let app = AppState::new(
        Arc::new(config),
        Arc::new(StubChainClient::new()),
        Arc::new(StubSigner::new()),
    );
    app.start().await?;
    info!("bot started, press Ctrl+C to stop");

    wait_for_shutdown().await;

    app.stop().await?;
    info!("bot stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for shutdown signal: {}", e),
    }
}
