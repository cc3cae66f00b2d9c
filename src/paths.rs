//! XDG-style path utilities for configuration and settings storage.

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "encyclo";

/// Returns the configuration directory for encyclo.
///
/// Resolution order:
/// 1. `$XDG_CONFIG_HOME/encyclo` if `XDG_CONFIG_HOME` is set
/// 2. `~/.config/encyclo` otherwise
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }
    let home = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".config").join(APP_DIR))
}

/// Path of the persisted credential/settings database.
pub fn settings_db_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.db"))
}
