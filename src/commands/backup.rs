//! Backup Commands
//!
//! Entry points for creating, listing, restoring and configuring backups.
//! Failures are reported inside the `CommandResponse`, with a stable
//! `error_code`, rather than as an `Err`.

use jurisdesk_core::{BackupConfig, BackupConfigUpdate, BackupInfo};

use crate::models::response::{BackupStatus, CommandResponse};
use crate::services::backup::RestoreReport;
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

/// Record that application data changed; a backup follows after the debounce
pub async fn notify_change(state: &AppState) -> Result<CommandResponse<bool>, String> {
    match state.backup().await {
        Ok(service) => {
            service.notify_change();
            Ok(CommandResponse::ok(true))
        }
        Err(e) => Ok(CommandResponse::from_error(&e)),
    }
}

/// Create a backup immediately. `data` is `None` when backups are disabled
/// or no password is available.
pub async fn run_backup_now(
    state: &AppState,
    password: Option<String>,
) -> Result<CommandResponse<Option<BackupInfo>>, String> {
    let result: AppResult<Option<BackupInfo>> = async {
        let service = state.backup().await?;
        service.run_now(password).await
    }
    .await;
    Ok(result.into())
}

/// Restore a backup by filename from the configured directory
pub async fn restore_backup(
    state: &AppState,
    filename: String,
    password: Option<String>,
) -> Result<CommandResponse<RestoreReport>, String> {
    let result: AppResult<RestoreReport> = async {
        let service = state.backup().await?;
        service.restore(&filename, password).await
    }
    .await;
    Ok(result.into())
}

/// List backups, newest first
pub async fn list_backups(state: &AppState) -> Result<CommandResponse<Vec<BackupInfo>>, String> {
    let result: AppResult<Vec<BackupInfo>> = async { state.backup().await?.list_backups() }.await;
    Ok(result.into())
}

/// Delete a backup by filename
pub async fn delete_backup(
    state: &AppState,
    filename: String,
) -> Result<CommandResponse<bool>, String> {
    let result: AppResult<bool> = async {
        state.backup().await?.delete_backup(&filename)?;
        Ok::<_, AppError>(true)
    }
    .await;
    Ok(result.into())
}

/// Current configuration, directory and last backup time
pub async fn get_backup_config(state: &AppState) -> Result<CommandResponse<BackupStatus>, String> {
    let result: AppResult<BackupStatus> = async {
        let service = state.backup().await?;
        Ok::<_, AppError>(BackupStatus {
            config: service.backup_config(),
            directory: service.backup_directory()?,
            last_backup_at: service.last_backup_at()?,
            has_password: service.has_password(),
        })
    }
    .await;
    Ok(result.into())
}

/// Apply a partial configuration update
pub async fn update_backup_config(
    state: &AppState,
    update: BackupConfigUpdate,
) -> Result<CommandResponse<BackupConfig>, String> {
    let result: AppResult<BackupConfig> = async { state.backup().await?.configure(update) }.await;
    Ok(result.into())
}

/// Remember the backup password for this session
pub async fn set_backup_password(
    state: &AppState,
    password: String,
) -> Result<CommandResponse<bool>, String> {
    if password.is_empty() {
        return Ok(CommandResponse::err("Password must not be empty"));
    }
    match state.backup().await {
        Ok(service) => service.set_password(password),
        Err(_) => state.secrets().set_password(password),
    }
    Ok(CommandResponse::ok(true))
}

/// Forget the session backup password
pub async fn clear_backup_password(state: &AppState) -> Result<CommandResponse<bool>, String> {
    state.secrets().clear();
    Ok(CommandResponse::ok(true))
}
