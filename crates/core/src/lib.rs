//! JurisDesk Core
//!
//! Foundational types for the JurisDesk Desktop backup subsystem. This crate
//! has zero dependencies on application-level code (database, crypto,
//! scheduling, etc.).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `snapshot` - Logical snapshot document (`DatabaseBackup`, `BackupTable`)
//! - `config` - Automatic backup configuration (`BackupConfig`)
//! - `info` - Backup file metadata (`BackupInfo`)
//! - `path_guard` - Directory boundary and filename checks

pub mod config;
pub mod error;
pub mod info;
pub mod path_guard;
pub mod snapshot;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Snapshot Document ──────────────────────────────────────────────────
pub use snapshot::{
    is_sensitive_setting_key, BackupTable, DatabaseBackup, Record, SNAPSHOT_VERSION,
};

// ── Configuration ──────────────────────────────────────────────────────
pub use config::{BackupConfig, BackupConfigUpdate};

// ── Files ──────────────────────────────────────────────────────────────
pub use info::BackupInfo;
pub use path_guard::{
    backup_filename, is_valid_backup_filename, is_within_root, parse_backup_timestamp,
    resolve_within_root,
};
