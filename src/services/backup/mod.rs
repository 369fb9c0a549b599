//! Encrypted Backup & Restore
//!
//! - `crypto`: PBKDF2 key derivation and AES-256-GCM
//! - `codec`: backup file format, current envelope and legacy plaintext
//! - `snapshotter`: database export and transactional import
//! - `store`: backup files on disk
//! - `scheduler`: debounced, rate-limited, single-flight automatic backups
//! - `service`: the facade commands talk to

pub mod clock;
pub mod codec;
pub mod crypto;
pub mod keyed_lock;
pub mod scheduler;
pub mod service;
pub mod snapshotter;
pub mod store;

pub use clock::{Clock, Timer, TimerHandle, TokioClock, TokioTimer};
pub use codec::{classify, EnvelopeShape, SnapshotCodec};
pub use keyed_lock::KeyedLocks;
pub use scheduler::{BackupScheduler, SnapshotJob, SnapshotPipeline, SnapshotRequest};
pub use service::{BackupService, RestoreReport};
pub use snapshotter::{ImportReport, ImportStage, Snapshotter, TableImport};
pub use store::BackupStore;
