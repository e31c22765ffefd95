//! Config command implementation

use crate::config::Config;
use crate::error::Result;
use crate::fetch::is_js_rendering_available;
use serde::Serialize;

/// Effective configuration and build capabilities
#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub config_file: String,
    pub config_file_exists: bool,
    pub local_embeddings: bool,
    pub js_rendering: bool,
    pub config: Config,
}

pub fn cmd_config(config: &Config) -> ConfigReport {
    ConfigReport {
        config_file: config.paths.config_file.display().to_string(),
        config_file_exists: config.paths.config_file.exists(),
        local_embeddings: cfg!(feature = "local-embed"),
        js_rendering: is_js_rendering_available(),
        config: config.clone(),
    }
}

pub fn print_config(report: &ConfigReport) -> Result<()> {
    let exists = if report.config_file_exists {
        ""
    } else {
        " (not found, using defaults)"
    };
    println!("# Config file: {}{}", report.config_file, exists);
    println!(
        "# Local embeddings: {}, JS rendering: {}\n",
        if report.local_embeddings { "yes" } else { "no" },
        if report.js_rendering { "yes" } else { "no" }
    );
    println!("{}", toml::to_string_pretty(&report.config)?);
    Ok(())
}
