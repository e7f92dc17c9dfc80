use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use orbit_application::Engine;
use orbit_core::event::EventBus;
use orbit_infrastructure::ConfigService;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "orbit")]
#[command(about = "ORBIT - run and orchestrate coding-assistant operations", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the command-line program and every configured backend
    Check,
    /// Run one operation
    Run(commands::run::RunArgs),
    /// Run operations listed in a JSON file
    Batch(commands::batch::BatchArgs),
    /// Print filesystem changes under the given directories
    Watch {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let service = match &cli.config {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new(),
    };

    if let Commands::Config { action } = &cli.command {
        return commands::config::run(&service, action);
    }

    let config = service
        .get_config()
        .context("Failed to load configuration")?;
    let bus = EventBus::new(config.events.capacity);
    let _log_guard = logging::init(&bus, cli.verbose)?;
    let engine = Engine::with_bus(config, bus).context("Failed to start engine")?;
    tracing::debug!(
        "[CLI] Started with backends {:?}",
        engine.orchestrator().registry().ids()
    );

    let result = match cli.command {
        Commands::Check => commands::check::run(&engine).await,
        Commands::Run(args) => commands::run::run(&engine, args).await,
        Commands::Batch(args) => commands::batch::run(&engine, args).await,
        Commands::Watch { paths } => commands::watch::run(&engine, paths).await,
        Commands::Config { .. } => Ok(()),
    };

    engine.shutdown().await?;
    result
}
