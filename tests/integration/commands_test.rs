//! Command Layer Integration Tests
//!
//! Commands never return `Err`; failures come back inside the response with
//! a stable `error_code`.

use tempfile::TempDir;

use jurisdesk_core::BackupConfigUpdate;
use jurisdesk_desktop::commands;
use jurisdesk_desktop::storage::Database;
use jurisdesk_desktop::AppState;

async fn initialized_state(tmp: &TempDir) -> AppState {
    let state = AppState::new();
    let db = Database::open(&tmp.path().join("jurisdesk.db")).unwrap();
    state.initialize_with(db, tmp.path().to_path_buf()).await.unwrap();
    state
}

#[tokio::test]
async fn test_commands_before_initialization() {
    let state = AppState::new();
    let response = commands::list_backups(&state).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("config"));
}

#[tokio::test]
async fn test_backup_list_delete_cycle() {
    let tmp = TempDir::new().unwrap();
    let state = initialized_state(&tmp).await;

    let skipped = commands::run_backup_now(&state, None).await.unwrap();
    assert!(skipped.success);
    assert_eq!(skipped.data, Some(None));

    commands::set_backup_password(&state, "pw".to_string()).await.unwrap();
    let created = commands::run_backup_now(&state, None).await.unwrap();
    let info = created.data.flatten().expect("backup created");

    let listed = commands::list_backups(&state).await.unwrap();
    assert_eq!(listed.data.unwrap().len(), 1);

    let status = commands::get_backup_config(&state).await.unwrap().data.unwrap();
    assert!(status.has_password);
    assert!(status.last_backup_at.is_some());

    let deleted = commands::delete_backup(&state, info.filename).await.unwrap();
    assert!(deleted.success);
    assert!(commands::list_backups(&state).await.unwrap().data.unwrap().is_empty());
}

#[tokio::test]
async fn test_error_codes() {
    let tmp = TempDir::new().unwrap();
    let state = initialized_state(&tmp).await;

    let traversal = commands::delete_backup(&state, "../../etc/passwd".to_string()).await.unwrap();
    assert_eq!(traversal.error_code.as_deref(), Some("validation"));

    let outside = tmp.path().with_file_name("somewhere_else");
    let update = BackupConfigUpdate {
        backup_path: Some(outside.to_string_lossy().into_owned()),
        ..Default::default()
    };
    let rejected = commands::update_backup_config(&state, update).await.unwrap();
    assert!(!rejected.success);
    assert_eq!(rejected.error_code.as_deref(), Some("path_traversal"));

    commands::set_backup_password(&state, "pw".to_string()).await.unwrap();
    let info = commands::run_backup_now(&state, None)
        .await
        .unwrap()
        .data
        .flatten()
        .unwrap();
    commands::clear_backup_password(&state).await.unwrap();

    let locked = commands::restore_backup(&state, info.filename.clone(), None).await.unwrap();
    assert_eq!(locked.error_code.as_deref(), Some("password_required"));

    let wrong = commands::restore_backup(&state, info.filename, Some("nope".into())).await.unwrap();
    assert_eq!(wrong.error_code.as_deref(), Some("crypto"));

    let missing = commands::restore_backup(
        &state,
        "jurisdesk_auto_2020-01-01T00-00-00-000Z.json".to_string(),
        Some("pw".into()),
    )
    .await
    .unwrap();
    assert_eq!(missing.error_code.as_deref(), Some("not_found"));
}

#[tokio::test]
async fn test_update_config_round_trip() {
    let tmp = TempDir::new().unwrap();
    let state = initialized_state(&tmp).await;

    let update = BackupConfigUpdate {
        enabled: Some(false),
        max_backups: Some(25),
        ..Default::default()
    };
    let config = commands::update_backup_config(&state, update).await.unwrap().data.unwrap();
    assert!(!config.enabled);
    assert_eq!(config.max_backups, 25);

    let status = commands::get_backup_config(&state).await.unwrap().data.unwrap();
    assert_eq!(status.config, config);

    assert!(commands::notify_change(&state).await.unwrap().success);
    let empty = commands::set_backup_password(&state, String::new()).await.unwrap();
    assert!(!empty.success);
}
