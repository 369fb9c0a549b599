//! Data Models
//!
//! Response types returned by the command layer. Backup document and
//! configuration types live in `jurisdesk-core`.

pub mod response;

pub use response::*;
