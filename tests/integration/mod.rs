//! Integration Tests Module
//!
//! End-to-end tests of the backup subsystem through its public API:
//! file format, restore atomicity, the backup directory, scheduling and the
//! command layer.

// Envelope encode/decode and legacy compatibility
mod codec_test;

// Export/import against real SQLite databases
mod restore_test;


// Debounce, minimum interval and single-flight behavior
mod scheduler_test;

// Command responses and error codes
mod commands_test;
