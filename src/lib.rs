//! JurisDesk Desktop - Backup Backend Library
//!
//! Encrypted backup and restore of the JurisDesk database:
//! - Command handlers used by the front end and the `jurisdesk-backup` CLI
//! - Backup services (crypto, snapshots, scheduling, file store)
//! - Storage layer (SQLite, backup settings, session password)
//! - Response models and utilities

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use commands::{
    clear_backup_password, delete_backup, get_backup_config, list_backups, notify_change,
    restore_backup, run_backup_now, set_backup_password, update_backup_config,
};
pub use models::response::*;
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
