//! Commands
//!
//! Command handlers called by the front end and by the CLI.

pub mod backup;

pub use backup::*;
