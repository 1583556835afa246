mod config;
pub mod database;

pub use config::{
    ClassPreferences, Config, CountdownConfig, FeedConfig, NotificationPreferences, NotificationsConfig,
    RefreshConfig, TimeUnit,
};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `GRIDWATCH_DATA_DIR` wins when set; otherwise `~/.config/gridwatch`, or
/// `~/.config/gridwatch-dev` when `GRIDWATCH_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("GRIDWATCH_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("GRIDWATCH_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("gridwatch-dev")
            } else {
                base_dir.join("gridwatch")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
