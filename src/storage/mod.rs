//! Storage Layer
//!
//! Handles all data persistence: SQLite database, backup settings, and the
//! session-scoped backup password.

pub mod config;
pub mod database;
pub mod secret;

pub use config::*;
pub use database::*;
pub use secret::*;
