//! Core Error Types
//!
//! Errors raised by the pure backup logic in this crate:
//! - `Config` for stored settings that cannot be parsed (`backup_max_count`,
//!   `backup_debounce_ms`, ...). Callers log these and fall back to defaults.
//! - `Validation` for names that are not `jurisdesk_auto_<timestamp>.json`.
//! - `Parse` for a well-formed backup filename whose timestamp is not a real
//!   instant.
//!
//! Database, crypto and filesystem failures belong to the application crate,
//! which converts `CoreError` into its own error type.

use thiserror::Error;

/// Error from settings parsing or backup filename handling
#[derive(Error, Debug)]
pub enum CoreError {
    /// A stored backup setting has an invalid value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backup filename does not match the expected pattern
    #[error("Validation error: {0}")]
    Validation(String),

    /// The timestamp embedded in a backup filename is not a valid instant
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
