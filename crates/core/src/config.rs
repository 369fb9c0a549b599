//! Backup Configuration
//!
//! Retention and scheduling settings for automatic backups. Values are stored
//! as plain strings in the settings table; anything missing, unparsable, or
//! non-positive falls back to the default.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_MAX_BACKUPS: u32 = 10;
pub const DEFAULT_DEBOUNCE_MS: u64 = 5_000;
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 60_000;

pub const KEY_ENABLED: &str = "backup_enabled";
pub const KEY_PATH: &str = "backup_path";
pub const KEY_MAX_BACKUPS: &str = "backup_max_count";
pub const KEY_DEBOUNCE_MS: &str = "backup_debounce_ms";
pub const KEY_MIN_INTERVAL_MS: &str = "backup_min_interval_ms";
pub const KEY_LAST_SUCCESS_AT: &str = "backup_last_success_at";

/// Prefix shared by every backup settings key.
pub const SETTINGS_PREFIX: &str = "backup_";

/// Automatic backup configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Whether automatic backups run at all
    pub enabled: bool,
    /// Custom backup directory; must live under the application data root
    pub backup_path: Option<String>,
    /// Number of newest backups kept by rotation
    pub max_backups: u32,
    /// Quiet period after the last change before a backup is attempted
    pub debounce_ms: u64,
    /// Minimum spacing between the starts of two backups
    pub min_interval_ms: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backup_path: None,
            max_backups: DEFAULT_MAX_BACKUPS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

/// Partial update of the backup configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupConfigUpdate {
    pub enabled: Option<bool>,
    /// `Some("")` clears the custom path
    pub backup_path: Option<String>,
    pub max_backups: Option<u32>,
    pub debounce_ms: Option<u64>,
    pub min_interval_ms: Option<u64>,
}

impl BackupConfig {
    /// Build a config from `(key, value)` rows of the settings table.
    ///
    /// Invalid values are logged and replaced by their defaults.
    pub fn from_settings<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();

        for (key, raw) in rows {
            let outcome = match key {
                KEY_ENABLED => parse_bool(key, raw).map(|v| config.enabled = v),
                KEY_PATH => {
                    let trimmed = raw.trim();
                    config.backup_path = (!trimmed.is_empty()).then(|| trimmed.to_string());
                    Ok(())
                }
                KEY_MAX_BACKUPS => parse_positive(key, raw)
                    .map(|v| config.max_backups = v.min(u32::MAX as u64) as u32),
                KEY_DEBOUNCE_MS => parse_positive(key, raw).map(|v| config.debounce_ms = v),
                KEY_MIN_INTERVAL_MS => parse_positive(key, raw).map(|v| config.min_interval_ms = v),
                _ => Ok(()),
            };

            if let Err(e) = outcome {
                tracing::warn!("[BackupConfig] {}; using default", e);
            }
        }

        config
    }

    /// Serialize into `(key, value)` pairs for the settings table.
    pub fn to_settings(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEY_ENABLED, self.enabled.to_string()),
            (KEY_PATH, self.backup_path.clone().unwrap_or_default()),
            (KEY_MAX_BACKUPS, self.max_backups.to_string()),
            (KEY_DEBOUNCE_MS, self.debounce_ms.to_string()),
            (KEY_MIN_INTERVAL_MS, self.min_interval_ms.to_string()),
        ]
    }

    /// Replace non-positive numeric values by their defaults.
    pub fn normalized(mut self) -> Self {
        if self.max_backups == 0 {
            self.max_backups = DEFAULT_MAX_BACKUPS;
        }
        if self.debounce_ms == 0 {
            self.debounce_ms = DEFAULT_DEBOUNCE_MS;
        }
        if self.min_interval_ms == 0 {
            self.min_interval_ms = DEFAULT_MIN_INTERVAL_MS;
        }
        if let Some(path) = &self.backup_path {
            if path.trim().is_empty() {
                self.backup_path = None;
            }
        }
        self
    }

    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: BackupConfigUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(path) = update.backup_path {
            let trimmed = path.trim();
            self.backup_path = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        if let Some(max) = update.max_backups {
            self.max_backups = max;
        }
        if let Some(debounce) = update.debounce_ms {
            self.debounce_ms = debounce;
        }
        if let Some(interval) = update.min_interval_ms {
            self.min_interval_ms = interval;
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> CoreResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CoreError::config(format!("{} has invalid boolean '{}'", key, other))),
    }
}

fn parse_positive(key: &str, raw: &str) -> CoreResult<u64> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::config(format!("{} is not a number: '{}'", key, raw)))?;
    if value <= 0 {
        return Err(CoreError::config(format!("{} must be positive, got {}", key, value)));
    }
    Ok(value as u64)
}
