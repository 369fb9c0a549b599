//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.
//! Everything the backend writes lives under a single data root
//! (`<data dir>/com.jurisdesk.app`), which is also the boundary for custom
//! backup directories.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Application identifier used for the data directory name
pub const APP_IDENTIFIER: &str = "com.jurisdesk.app";

/// Name of the default backup subdirectory under the data root
pub const BACKUP_DIR_NAME: &str = "backups";

/// Database file name under the data root
pub const DATABASE_FILE_NAME: &str = "jurisdesk.db";

/// Get the application data root (e.g. ~/.local/share/com.jurisdesk.app)
pub fn app_data_dir() -> AppResult<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_IDENTIFIER))
        .ok_or_else(|| AppError::config("Could not determine application data directory"))
}

/// Get the database file path (<root>/jurisdesk.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(app_data_dir()?.join(DATABASE_FILE_NAME))
}

/// Default backup directory for a given data root
pub fn default_backup_dir(root: &Path) -> PathBuf {
    root.join(BACKUP_DIR_NAME)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
