//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use std::fmt;

use jurisdesk_core::CoreError;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Wrong password, tampered ciphertext, or a failing cipher
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The backup is encrypted but no password was supplied
    #[error("A password is required to open this backup")]
    PasswordRequired,

    /// A backup directory outside the application data root
    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    /// A restore transaction failed and was rolled back
    #[error("{0}")]
    Transaction(Box<TransactionFailure>),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a path traversal error
    pub fn path_traversal(msg: impl Into<String>) -> Self {
        Self::PathTraversal(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code, used by callers to pick a reaction
    /// (e.g. prompt for a password instead of reporting corruption).
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Sqlite(_) => "database",
            AppError::Crypto(_) => "crypto",
            AppError::PasswordRequired => "password_required",
            AppError::PathTraversal(_) => "path_traversal",
            AppError::Transaction(_) => "transaction",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(msg) => AppError::Config(msg),
            CoreError::Validation(msg) | CoreError::Parse(msg) => AppError::Validation(msg),
        }
    }
}

impl From<TransactionFailure> for AppError {
    fn from(failure: TransactionFailure) -> Self {
        AppError::Transaction(Box::new(failure))
    }
}

/// Convert AppError to a string suitable for command responses
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}

// ============================================================================
// Restore transaction failures
// ============================================================================

/// Step of the restore recovery path that can itself fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStep {
    Rollback,
    RestoreConstraints,
}

/// A failure that happened while recovering from the primary error
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryFailure {
    pub step: RecoveryStep,
    pub message: String,
}

/// Outcome of a failed restore: the error that aborted the import plus any
/// secondary failures hit while rolling back.
///
/// The primary error is always what the caller sees; recovery failures are
/// kept for logging and diagnostics.
#[derive(Debug)]
pub struct TransactionFailure {
    /// Import stage that was active when the primary error occurred
    pub stage: String,
    pub primary: AppError,
    pub recovery_failures: Vec<RecoveryFailure>,
}

impl TransactionFailure {
    pub fn new(stage: impl Into<String>, primary: AppError) -> Self {
        Self {
            stage: stage.into(),
            primary,
            recovery_failures: Vec::new(),
        }
    }

    /// Whether the live database was fully recovered
    pub fn is_clean(&self) -> bool {
        self.recovery_failures.is_empty()
    }
}

impl fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Restore transaction failed while {}: {}",
            self.stage, self.primary
        )?;
        if !self.recovery_failures.is_empty() {
            write!(f, " ({} recovery step(s) also failed)", self.recovery_failures.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for TransactionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary)
    }
}
