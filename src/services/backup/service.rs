//! Backup Service
//!
//! Caller-facing entry point of the backup subsystem. Wires the snapshotter,
//! codec, store and scheduler to one database, the session password and the
//! persisted configuration.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jurisdesk_core::{BackupConfig, BackupConfigUpdate, BackupInfo};
use serde::Serialize;
use tracing::{info, warn};

use super::codec::SnapshotCodec;
use super::scheduler::{BackupScheduler, SnapshotPipeline};
use super::snapshotter::{ImportReport, Snapshotter};
use super::store::BackupStore;
use crate::storage::config::BackupConfigStore;
use crate::storage::database::Database;
use crate::storage::secret::SessionSecretStore;
use crate::utils::error::{AppError, AppResult};

/// Outcome of a successful restore
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub filename: String,
    pub snapshot_created_at: DateTime<Utc>,
    pub import: ImportReport,
    /// False when the full-text index could not be rebuilt; search may be stale
    pub search_index_rebuilt: bool,
}

pub struct BackupService {
    db: Database,
    snapshotter: Snapshotter,
    codec: SnapshotCodec,
    store: Arc<BackupStore>,
    config_store: BackupConfigStore,
    secrets: Arc<SessionSecretStore>,
    scheduler: BackupScheduler,
}

impl BackupService {
    /// Create the service on the current tokio runtime.
    ///
    /// `allowed_root` bounds every backup directory, custom ones included.
    pub fn new(
        db: Database,
        allowed_root: impl Into<PathBuf>,
        secrets: Arc<SessionSecretStore>,
    ) -> AppResult<Self> {
        Self::with_codec(db, allowed_root, secrets, SnapshotCodec::new())
    }

    pub fn with_codec(
        db: Database,
        allowed_root: impl Into<PathBuf>,
        secrets: Arc<SessionSecretStore>,
        codec: SnapshotCodec,
    ) -> AppResult<Self> {
        let config_store = BackupConfigStore::new(db.clone());
        let config = config_store.load()?;
        let snapshotter = Snapshotter::new(db.clone());
        let store = Arc::new(BackupStore::new(allowed_root));

        let pipeline = SnapshotPipeline::new(
            snapshotter.clone(),
            codec.clone(),
            store.clone(),
            config_store.clone(),
        );
        let scheduler = BackupScheduler::new(config, Arc::new(pipeline), secrets.clone())?;

        Ok(Self {
            db,
            snapshotter,
            codec,
            store,
            config_store,
            secrets,
            scheduler,
        })
    }

    /// Signal that application data changed
    pub fn notify_change(&self) {
        self.scheduler.notify_change();
    }

    /// Back up now. `None` means backups are disabled or no password is known.
    pub async fn run_now(&self, password: Option<String>) -> AppResult<Option<BackupInfo>> {
        self.scheduler.run_now(password).await
    }

    /// Replace the live data with the content of a backup file.
    ///
    /// Holds the scheduler's single-flight lock for the whole restore, so no
    /// backup is taken of a half-restored database.
    pub async fn restore(
        &self,
        filename: &str,
        password: Option<String>,
    ) -> AppResult<RestoreReport> {
        let exclusive = self.scheduler.exclusive().await;
        let result = self.restore_locked(filename, password).await;
        drop(exclusive);
        self.scheduler.reschedule_if_pending();
        result
    }

    async fn restore_locked(
        &self,
        filename: &str,
        password: Option<String>,
    ) -> AppResult<RestoreReport> {
        let password = self.secrets.resolve(password);
        let dir = self.backup_directory()?;
        let store = self.store.clone();
        let codec = self.codec.clone();
        let snapshotter = self.snapshotter.clone();
        let db = self.db.clone();
        let filename = filename.to_string();

        let report = tokio::task::spawn_blocking(move || -> AppResult<RestoreReport> {
            let bytes = store.read(&dir, &filename)?;
            let snapshot = codec.decode(&bytes, password.as_deref())?;
            let import = snapshotter.import(&snapshot)?;

            let search_index_rebuilt = match db.rebuild_document_search_index() {
                Ok(()) => true,
                Err(e) => {
                    warn!("[BackupService] Search index rebuild failed after restore: {}", e);
                    false
                }
            };

            Ok(RestoreReport {
                filename,
                snapshot_created_at: snapshot.created_at,
                import,
                search_index_rebuilt,
            })
        })
        .await
        .map_err(|e| AppError::internal(format!("Restore task failed: {}", e)))??;

        // The restored settings table carries its own backup configuration.
        match self.config_store.load() {
            Ok(config) => self.scheduler.configure(config),
            Err(e) => warn!("[BackupService] Could not reload backup config after restore: {}", e),
        }

        info!(
            "[BackupService] Restored {} ({} rows)",
            report.filename,
            report.import.total_rows()
        );
        Ok(report)
    }

    /// Backups in the configured directory, newest first
    pub fn list_backups(&self) -> AppResult<Vec<BackupInfo>> {
        let dir = self.backup_directory()?;
        self.store.list(&dir)
    }

    pub fn delete_backup(&self, filename: &str) -> AppResult<()> {
        let dir = self.backup_directory()?;
        self.store.delete(&dir, filename)
    }

    /// Apply a partial configuration change, persist it, and reschedule.
    ///
    /// A new custom directory outside the data root is rejected.
    pub fn configure(&self, update: BackupConfigUpdate) -> AppResult<BackupConfig> {
        if let Some(path) = update.backup_path.as_deref().map(str::trim) {
            if !path.is_empty() {
                self.store.check_directory(path)?;
            }
        }

        let mut config = self.scheduler.config();
        config.apply_update(update);
        let config = config.normalized();

        self.config_store.save(&config)?;
        self.scheduler.configure(config.clone());
        info!("[BackupService] Backup configuration updated");
        Ok(config)
    }

    pub fn backup_config(&self) -> BackupConfig {
        self.scheduler.config()
    }

    /// Resolved backup directory for the current configuration
    pub fn backup_directory(&self) -> AppResult<PathBuf> {
        self.store.resolve_directory(&self.scheduler.config())
    }

    pub fn last_backup_at(&self) -> AppResult<Option<DateTime<Utc>>> {
        self.config_store.last_success()
    }

    /// Remember the session password and schedule any change that was
    /// waiting for one.
    pub fn set_password(&self, password: impl Into<String>) {
        self.secrets.set_password(password);
        self.scheduler.reschedule_if_pending();
    }

    pub fn clear_password(&self) {
        self.secrets.clear();
    }

    pub fn has_password(&self) -> bool {
        self.secrets.has_password()
    }

    pub fn scheduler(&self) -> &BackupScheduler {
        &self.scheduler
    }
}

impl std::fmt::Debug for BackupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupService")
            .field("allowed_root", &self.store.allowed_root())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
