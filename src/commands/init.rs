//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub config_path: PathBuf,
    pub force: bool,
}

/// Write the default configuration file
pub fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions { config_path, force } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let base_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_base_dir);
    let mut config = Config::with_base_dir(base_dir);
    config.paths.config_file = config_path;

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    Ok(config)
}

pub fn print_init(config: &Config) {
    println!("✓ Wrote default configuration to {:?}", config.paths.config_file);
    println!("\nNext steps:");
    println!("  webrag config                          # Show the effective configuration");
    println!("  webrag ask \"what is the capital of France?\"");
}
