//! Services
//!
//! Business logic services for the application.
//! Services handle the core functionality and are called by commands.

pub mod backup;

pub use backup::{BackupScheduler, BackupService, RestoreReport};
