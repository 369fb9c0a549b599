//! Backup Store
//!
//! Filesystem operations on backup files. Every operation takes a directory
//! that came out of `resolve_directory`, and every filename is validated
//! before the filesystem is touched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jurisdesk_core::{is_valid_backup_filename, parse_backup_timestamp, resolve_within_root};
use jurisdesk_core::{BackupConfig, BackupInfo};
use tracing::{debug, info, warn};

use super::keyed_lock::KeyedLocks;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{default_backup_dir, ensure_dir};

#[derive(Debug)]
pub struct BackupStore {
    allowed_root: PathBuf,
    locks: KeyedLocks,
}

impl BackupStore {
    pub fn new(allowed_root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.into(),
            locks: KeyedLocks::new(),
        }
    }

    /// Boundary every backup directory must stay inside
    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    pub fn default_directory(&self) -> PathBuf {
        default_backup_dir(&self.allowed_root)
    }

    /// Validate a user-supplied backup directory.
    ///
    /// Used when a new path is configured, where a rejected path is an error
    /// rather than a silent fallback. Returns the resolved directory, with
    /// symlinks followed and `..` applied; only that path is safe to touch.
    pub fn check_directory(&self, path: &str) -> AppResult<PathBuf> {
        let candidate = PathBuf::from(path.trim());
        if !candidate.is_absolute() {
            return Err(AppError::path_traversal(format!(
                "Backup directory must be an absolute path: {}",
                path
            )));
        }
        resolve_within_root(&candidate, &self.allowed_root).ok_or_else(|| {
            AppError::path_traversal(format!(
                "Backup directory {} is outside {}",
                candidate.display(),
                self.allowed_root.display()
            ))
        })
    }

    /// Directory backups go to for this configuration, created if missing.
    ///
    /// A custom path that is relative or outside the allowed root is ignored
    /// in favour of the default directory.
    pub fn resolve_directory(&self, config: &BackupConfig) -> AppResult<PathBuf> {
        let custom = config
            .backup_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let dir = match custom {
            Some(path) => match self.check_directory(path) {
                Ok(dir) => dir,
                Err(e) => {
                    warn!("[BackupStore] {}; using the default directory", e);
                    self.default_directory()
                }
            },
            None => self.default_directory(),
        };

        self.locks.with_lock(&dir, || ensure_dir(&dir))?;
        Ok(dir)
    }

    /// Write a backup atomically: temp file in the same directory, then rename.
    pub fn write(&self, dir: &Path, filename: &str, bytes: &[u8]) -> AppResult<BackupInfo> {
        validate_filename(filename)?;
        let target = dir.join(filename);
        let temp = dir.join(format!(".{}.{}.tmp", filename, uuid::Uuid::new_v4()));

        self.locks.with_lock(dir, || -> AppResult<()> {
            let written = write_and_sync(&temp, bytes).and_then(|_| fs::rename(&temp, &target));
            if let Err(e) = written {
                let _ = fs::remove_file(&temp);
                return Err(e.into());
            }
            Ok(())
        })?;

        info!("[BackupStore] Wrote {} ({} bytes)", filename, bytes.len());
        self.stat(dir, filename)
    }

    /// Read the raw bytes of a backup file
    pub fn read(&self, dir: &Path, filename: &str) -> AppResult<Vec<u8>> {
        validate_filename(filename)?;
        let path = dir.join(filename);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("Backup not found: {}", filename)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata for a single backup file
    pub fn stat(&self, dir: &Path, filename: &str) -> AppResult<BackupInfo> {
        validate_filename(filename)?;
        let path = dir.join(filename);
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!("Backup not found: {}", filename)))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(describe(filename, path, &metadata))
    }

    /// Backups in `dir`, newest first. Files with other names are ignored.
    pub fn list(&self, dir: &Path) -> AppResult<Vec<BackupInfo>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !is_valid_backup_filename(&name) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_file() {
                backups.push(describe(&name, entry.path(), &metadata));
            }
        }

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(backups)
    }

    /// Delete one backup file
    pub fn delete(&self, dir: &Path, filename: &str) -> AppResult<()> {
        validate_filename(filename)?;
        let path = dir.join(filename);
        self.locks.with_lock(dir, || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("Backup not found: {}", filename)))
            }
            Err(e) => Err(e.into()),
        })?;
        info!("[BackupStore] Deleted {}", filename);
        Ok(())
    }

    /// Keep the `max_backups` newest backups and delete the rest.
    ///
    /// Returns the names that were deleted. A file that cannot be removed is
    /// logged and skipped.
    pub fn rotate(&self, dir: &Path, max_backups: u32) -> AppResult<Vec<String>> {
        let keep = max_backups.max(1) as usize;

        self.locks.with_lock(dir, || {
            let backups = self.list(dir)?;
            let mut deleted = Vec::new();
            for old in backups.into_iter().skip(keep) {
                match fs::remove_file(&old.path) {
                    Ok(()) => deleted.push(old.filename),
                    Err(e) => warn!(
                        "[BackupStore] Failed to remove old backup {}: {}",
                        old.filename, e
                    ),
                }
            }
            if !deleted.is_empty() {
                debug!("[BackupStore] Rotated out {} backup(s)", deleted.len());
            }
            Ok(deleted)
        })
    }
}

fn validate_filename(filename: &str) -> AppResult<()> {
    if is_valid_backup_filename(filename) {
        Ok(())
    } else {
        Err(AppError::validation(format!("Invalid backup filename: {:?}", filename)))
    }
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn describe(filename: &str, path: PathBuf, metadata: &fs::Metadata) -> BackupInfo {
    let created_at = parse_backup_timestamp(filename)
        .ok()
        .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from))
        .unwrap_or_else(Utc::now);

    BackupInfo {
        filename: filename.to_string(),
        path,
        size: metadata.len(),
        created_at,
    }
}
