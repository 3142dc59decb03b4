mod config;
pub mod database;
pub mod ledger;
pub mod migrations;

pub use config::{Config, HistoryConfig, LogConfig, ScheduleConfig, StorageConfig, PAGE_SIZE_LIMIT};
pub use database::HabitDb;
pub use ledger::{AuditTrail, HabitRepository, RecordLedger};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the Habitroom data directory, creating it if needed.
///
/// `HABITROOM_DATA_DIR` overrides the location outright. Otherwise the
/// directory is `~/.config/habitroom[-dev]/`, with `HABITROOM_ENV=dev`
/// selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("HABITROOM_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("HABITROOM_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("habitroom-dev")
            } else {
                base_dir.join("habitroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
