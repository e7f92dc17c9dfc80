use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::Colorize;

use orbit_core::config::EngineConfig;
use orbit_infrastructure::ConfigService;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the configuration file location
    Path,
    /// Print the effective configuration as TOML
    Show,
    /// Write a configuration file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(service: &ConfigService, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", service.config_path()?.display());
        }
        ConfigAction::Show => {
            let config = service
                .get_config()
                .context("Failed to load configuration")?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            let path = service.config_path()?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let written = service.save(&EngineConfig::default())?;
            println!("{} {}", "Wrote".green(), written.display());
        }
    }
    Ok(())
}
