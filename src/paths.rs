//! Common paths for Tusk data storage
//!
//! All Tusk data is stored under ~/.config/tusk/ on all platforms:
//! - config.toml - User configuration
//! - credentials/ - One encrypted file per signed-in account
//! - tusk.sqlite - Feed cache and app state
//! - legacy.sqlite - Credentials written by older releases (read once)

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Get the Tusk data directory (~/.config/tusk/)
///
/// This is consistent across all platforms for simplicity.
pub fn tusk_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let tusk_dir = home.join(".config").join("tusk");
    fs::create_dir_all(&tusk_dir).context("Failed to create tusk directory")?;
    Ok(tusk_dir)
}

/// Get the config file path (~/.config/tusk/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(tusk_dir()?.join("config.toml"))
}

/// Get the database file path (~/.config/tusk/tusk.sqlite)
pub fn database_path() -> Result<PathBuf> {
    Ok(tusk_dir()?.join("tusk.sqlite"))
}

/// Get the legacy credential database path (~/.config/tusk/legacy.sqlite)
pub fn legacy_database_path() -> Result<PathBuf> {
    Ok(tusk_dir()?.join("legacy.sqlite"))
}

/// Get the credentials directory (~/.config/tusk/credentials/)
pub fn credentials_dir() -> Result<PathBuf> {
    let dir = tusk_dir()?.join("credentials");
    fs::create_dir_all(&dir).context("Failed to create credentials directory")?;
    Ok(dir)
}
