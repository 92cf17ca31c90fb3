//! Configuration file lookup and parsing.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::Config;
use super::validation::validate_config;
use crate::common::constants::*;

/// Default configuration file location: `$XDG_CONFIG_HOME/hypr/hyprsunset.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub(super) fn load(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return load_from_path(path);
    }

    let path = default_config_path()?;
    if !path.exists() {
        log_info!(
            "No config found at {}, using defaults. Consider creating one.",
            path.display()
        );
        return Ok(Config::default());
    }

    load_from_path(&path)
}

/// Load and validate the configuration at `path`. The file must exist.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;

    validate_config(&config)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    Ok(config)
}
