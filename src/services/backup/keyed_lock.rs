//! Per-directory mutual exclusion.
//!
//! Each backup directory gets its own mutex, created on first use, so that
//! directory creation, writes and rotation in one directory never interleave
//! while unrelated directories proceed independently.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `key`, created if needed
    pub fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_path_buf()).or_default().clone()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(key);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
