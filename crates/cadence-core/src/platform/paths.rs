//! Platform-specific path utilities.

use crate::config::{DatabaseConfig, PathsConfig};
use crate::error::{CadenceError, Result};
use std::path::PathBuf;

/// Get the Cadence global configuration directory.
///
/// This is the well-known location for cross-process shared state
/// like the instance-claim database.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/cadence` (XDG_CONFIG_HOME)
/// - **Windows**: `%APPDATA%\cadence`
/// - **macOS**: `~/Library/Application Support/cadence`
pub fn cadence_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| CadenceError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join(PathsConfig::APP_CONFIG_DIR_NAME))
}

/// Get the path to the shared instance-claim database.
///
/// Returns `{cadence_config_dir}/instances.db`.
pub fn claims_db_path() -> Result<PathBuf> {
    Ok(cadence_config_dir()?.join(PathsConfig::CLAIMS_DB_FILENAME))
}

/// Get the default location of the session database.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share/cadence/cadence.sqlite` (XDG_DATA_HOME)
/// - **Windows**: `%APPDATA%\cadence\cadence.sqlite`
/// - **macOS**: `~/Library/Application Support/cadence/cadence.sqlite`
pub fn default_session_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| CadenceError::Config {
        message: "Could not determine platform data directory".to_string(),
    })?;
    Ok(data_dir
        .join(PathsConfig::APP_CONFIG_DIR_NAME)
        .join(DatabaseConfig::SESSION_DB_FILENAME))
}
