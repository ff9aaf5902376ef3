//! Configuration inspection.

use anyhow::{Context, Result};

use kivra_sync_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
        ConfigAction::Show => {
            let config = Config::load().context("failed to load configuration")?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init => {
            let path = Config::config_path();
            if path.exists() {
                println!("Configuration already exists at {}", path.display());
            } else {
                Config::default().save()?;
                println!("Wrote default configuration to {}", path.display());
            }
        }
    }
    Ok(())
}
