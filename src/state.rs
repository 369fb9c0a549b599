//! Application State
//!
//! Shared state holding the database and the backup service.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::backup::BackupService;
use crate::storage::{Database, SessionSecretStore};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::app_data_dir;

/// Application state shared by all commands
pub struct AppState {
    /// SQLite database with connection pool
    database: Arc<RwLock<Option<Database>>>,
    /// Backup service, available once initialized
    backup: Arc<RwLock<Option<Arc<BackupService>>>>,
    /// Session-scoped backup password
    secrets: Arc<SessionSecretStore>,
    /// Whether the state has been initialized
    initialized: Arc<RwLock<bool>>,
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            database: Arc::new(RwLock::new(None)),
            backup: Arc::new(RwLock::new(None)),
            secrets: Arc::new(SessionSecretStore::new()),
            initialized: Arc::new(RwLock::new(false)),
        }
    }

    /// Open the on-disk database under the application data root
    pub async fn initialize(&self) -> AppResult<()> {
        let root = app_data_dir()?;
        let db = Database::new()?;
        self.initialize_with(db, root).await
    }

    /// Initialize with an explicit database and data root
    pub async fn initialize_with(&self, db: Database, root: PathBuf) -> AppResult<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        let service = BackupService::new(db.clone(), root, self.secrets.clone())?;

        {
            let mut db_lock = self.database.write().await;
            *db_lock = Some(db);
        }
        {
            let mut backup_lock = self.backup.write().await;
            *backup_lock = Some(Arc::new(service));
        }

        *initialized = true;
        Ok(())
    }

    /// Check if database is healthy
    pub fn is_database_healthy(&self) -> bool {
        // Use try_read to avoid blocking
        if let Ok(guard) = self.database.try_read() {
            if let Some(ref db) = *guard {
                return db.is_healthy();
            }
        }
        false
    }

    /// Get the backup service
    pub async fn backup(&self) -> AppResult<Arc<BackupService>> {
        let guard = self.backup.read().await;
        match &*guard {
            Some(service) => Ok(service.clone()),
            None => Err(AppError::config("Backup service not initialized")),
        }
    }

    /// Signal a data change without waiting.
    ///
    /// Does nothing before initialization or while the state is being
    /// (re)initialized.
    pub fn notify_change(&self) {
        if let Ok(guard) = self.backup.try_read() {
            if let Some(ref service) = *guard {
                service.notify_change();
            }
        }
    }

    pub fn secrets(&self) -> &SessionSecretStore {
        &self.secrets
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
