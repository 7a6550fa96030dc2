//! Path resolution for branch-planner
//!
//! # Environment Variables
//!
//! - `BRANCH_PLANNER_CONFIG_DIR` - Override config directory
//! - `BRANCH_PLANNER_STORE_DIR` - Override object store directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `BRANCH_PLANNER_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/branch-planner` (if set)
//! 3. `~/.config/branch-planner`
//!
//! For store_dir():
//! 1. `BRANCH_PLANNER_STORE_DIR` environment variable
//! 2. `XDG_DATA_HOME/branch-planner/store` (if set)
//! 3. `~/.local/share/branch-planner/store`

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "branch-planner";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "BRANCH_PLANNER_CONFIG_DIR";

/// Environment variable for store directory override
pub const ENV_STORE_DIR: &str = "BRANCH_PLANNER_STORE_DIR";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Default config file location
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the default object store directory
pub fn store_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STORE_DIR) {
        let path = expand(&dir);
        log::debug!("Using store dir from {}: {}", ENV_STORE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        let path = PathBuf::from(xdg_data).join(APP_DIR).join("store");
        log::debug!("Using XDG_DATA_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home
        .join(".local")
        .join("share")
        .join(APP_DIR)
        .join("store");
    log::debug!("Using default store dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
