//! Backup Configuration Storage
//!
//! Reads and writes `BackupConfig` through the settings table.

use chrono::{DateTime, Utc};
use jurisdesk_core::config::{KEY_LAST_SUCCESS_AT, SETTINGS_PREFIX};
use jurisdesk_core::BackupConfig;

use crate::storage::database::Database;
use crate::utils::error::AppResult;

/// Configuration service for automatic backup settings
#[derive(Debug, Clone)]
pub struct BackupConfigStore {
    db: Database,
}

impl BackupConfigStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the stored configuration; missing or invalid values use defaults
    pub fn load(&self) -> AppResult<BackupConfig> {
        let rows = self.db.get_settings_by_prefix(SETTINGS_PREFIX)?;
        Ok(BackupConfig::from_settings(
            rows.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }

    /// Persist the configuration
    pub fn save(&self, config: &BackupConfig) -> AppResult<()> {
        self.db.set_settings(&config.to_settings())
    }

    /// Record the time of the last successful backup
    pub fn record_success(&self, at: DateTime<Utc>) -> AppResult<()> {
        self.db.set_setting(KEY_LAST_SUCCESS_AT, &at.to_rfc3339())
    }

    /// Time of the last successful backup, if any
    pub fn last_success(&self) -> AppResult<Option<DateTime<Utc>>> {
        let raw = self.db.get_setting(KEY_LAST_SUCCESS_AT)?;
        Ok(raw.and_then(|s| match DateTime::parse_from_rfc3339(&s) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("[BackupConfig] Ignoring invalid last-success timestamp: {}", e);
                None
            }
        }))
    }
}
