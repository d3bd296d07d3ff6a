use crate::error::{Result, SheafError};
use std::fs;
use std::path::PathBuf;

const APP_NAME: &str = "sheaf";
const CONFIG_FILE: &str = "config.toml";

/// Get the path to the config file in the app data directory
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory (created on demand)
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.ok_or_else(|| {
        SheafError::Configuration("Could not determine app data directory".to_string())
    })?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Default location for a file-backed connection that names no path
pub fn default_connection_dir(connection: &str) -> Result<PathBuf> {
    let dir = get_app_data_dir()?.join("connections").join(sanitize(connection));
    Ok(dir)
}

/// Keep a connection name safe for use as a directory name
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
