//! Restore Integration Tests
//!
//! Export and import against file-backed SQLite databases (WAL, pooled):
//! - credentials never leave the database
//! - a failing import leaves every table untouched and constraints on
//! - encrypted and legacy backups restore through the service
//! - defaults are filled for rows from older backups

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;

use jurisdesk_core::{backup_filename, BackupTable, DatabaseBackup, Record};
use jurisdesk_desktop::services::backup::{BackupService, Snapshotter};
use jurisdesk_desktop::storage::{Database, SessionSecretStore};
use jurisdesk_desktop::utils::error::AppError;

// ============================================================================
// Helpers
// ============================================================================

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record must be a JSON object")
}

fn open_db(root: &Path) -> Database {
    Database::open(&root.join("jurisdesk.db")).expect("Failed to open test database")
}

fn seed(db: &Database) {
    let conn = db.get_connection().unwrap();
    conn.execute_batch(
        "INSERT INTO clients (id, name, created_at, updated_at) VALUES (1, 'Acme', '2024-01-01', '2024-01-01');
         INSERT INTO clients (id, name, created_at, updated_at) VALUES (2, 'Globex', '2024-01-03', '2024-01-04');
         INSERT INTO cases (id, client_id, title) VALUES (1, 1, 'Acme v. Globex');
         INSERT INTO document_folders (id, name, case_id) VALUES (1, 'Pleadings', 1);
         INSERT INTO documents (id, case_id, folder_id, name, path, content_text)
             VALUES (1, 1, 1, 'petition.pdf', '/docs/petition.pdf', 'lease termination notice');
         INSERT INTO deadlines (case_id, title, due_date) VALUES (1, 'Reply', '2024-05-01');
         INSERT INTO chat_sessions (id, title, case_id) VALUES (1, 'Research', 1);
         INSERT INTO chat_messages (id, session_id, role, content) VALUES (1, 1, 'user', 'hello');
         INSERT INTO chat_attachments (message_id, document_id, name) VALUES (1, 1, 'petition.pdf');
         INSERT INTO activity_logs (entity_type, entity_id, action) VALUES ('case', 1, 'create');
         INSERT INTO ai_usage_logs (provider, model, input_tokens, output_tokens) VALUES ('claude', 'm', 10, 20);
         INSERT INTO settings (key, value) VALUES ('theme', 'dark');
         INSERT INTO settings (key, value) VALUES ('claude_api_key', 'sk-ant-live');
         INSERT INTO settings (key, value) VALUES ('openai_api_key', 'sk-live');
         INSERT INTO settings (key, value) VALUES ('custom_provider_api_key', 'xyz');",
    )
    .unwrap();
}

fn search_hits(db: &Database, term: &str) -> i64 {
    let conn = db.get_connection().unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM documents_fts WHERE documents_fts MATCH ?1",
        [term],
        |row| row.get(0),
    )
    .unwrap()
}

// ============================================================================
// Export
// ============================================================================

#[test]
fn test_export_never_contains_credentials() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());
    seed(&db);

    let doc = Snapshotter::new(db).export().unwrap();
    let keys: Vec<&str> = doc
        .settings
        .iter()
        .filter_map(|r| r.get("key").and_then(Value::as_str))
        .collect();

    assert!(keys.contains(&"theme"));
    assert!(!keys.contains(&"claude_api_key"));
    assert!(!keys.contains(&"openai_api_key"));
    assert!(!keys.contains(&"custom_provider_api_key"));

    let serialized = serde_json::to_string(&doc).unwrap();
    assert!(!serialized.contains("sk-ant-live"));
}

#[test]
fn test_export_covers_every_table() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());
    seed(&db);

    let doc = Snapshotter::new(db).export().unwrap();
    for table in BackupTable::ALL {
        assert!(!doc.table(table).is_empty(), "table {} missing", table);
    }
    assert_eq!(doc.clients.len(), 2);
    assert_eq!(doc.clients[0]["id"], 1);
    assert_eq!(doc.clients[1]["id"], 2);
}

// ============================================================================
// Import atomicity
// ============================================================================

#[test]
fn test_foreign_key_violation_leaves_database_unchanged() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());
    seed(&db);
    let snapshotter = Snapshotter::new(db.clone());
    let before = snapshotter.export().unwrap();

    let mut doc = DatabaseBackup::empty(Utc::now());
    doc.clients = vec![record(json!({"id": 10, "name": "New client"}))];
    doc.cases = vec![record(json!({"id": 10, "client_id": 10, "title": "Fine"}))];
    // references a session that is not in the document
    doc.chat_messages = vec![record(json!({
        "id": 10,
        "session_id": 999,
        "role": "user",
        "content": "x"
    }))];

    let err = snapshotter.import(&doc).unwrap_err();
    assert_eq!(err.code(), "transaction");

    let after = snapshotter.export().unwrap();
    assert_eq!(before, DatabaseBackup { created_at: before.created_at, ..after });
    assert_eq!(db.get_setting("claude_api_key").unwrap().as_deref(), Some("sk-ant-live"));

    // enforcement is on for whichever pooled connection comes next
    let connections: Vec<_> = (0..3).map(|_| db.get_connection().unwrap()).collect();
    for conn in &connections {
        assert!(Database::foreign_keys_enabled(conn).unwrap());
    }
}

#[test]
fn test_failed_import_reports_stage() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());
    seed(&db);

    let mut doc = DatabaseBackup::empty(Utc::now());
    doc.clients = vec![record(json!({"id": 1, "name": null}))];

    match Snapshotter::new(db.clone()).import(&doc) {
        Err(AppError::Transaction(failure)) => {
            assert_eq!(failure.stage, "inserting into clients (row 1)");
            assert!(failure.recovery_failures.is_empty());
            assert!(failure.to_string().contains("inserting into clients"));
        }
        other => panic!("expected a transaction failure, got {:?}", other),
    }
    assert_eq!(db.count_rows("clients").unwrap(), 2);
}

// ============================================================================
// Import defaults
// ============================================================================

#[test]
fn test_import_fills_defaults_from_older_backups() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());

    let created = "2023-11-20T08:00:00+00:00";
    let mut doc: DatabaseBackup = serde_json::from_value(json!({
        "version": "1.0",
        "created_at": created,
        "clients": [{"id": 1, "name": "Acme", "created_at": "2023-01-01 09:00:00"}],
        "cases": [{"id": 1, "client_id": 1, "title": "Old case"}],
        "deadlines": [{"id": 1, "case_id": 1, "title": "Hearing", "due_date": "2024-01-10"}]
    }))
    .unwrap();
    doc.ai_usage_logs = vec![record(json!({"provider": "openai", "model": "m"}))];

    Snapshotter::new(db.clone()).import(&doc).unwrap();

    let conn = db.get_connection().unwrap();
    let client_updated: String = conn
        .query_row("SELECT updated_at FROM clients WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(client_updated, "2023-01-01 09:00:00");

    let (case_created, case_updated): (String, String) = conn
        .query_row("SELECT created_at, updated_at FROM cases WHERE id = 1", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(case_created, created);
    assert_eq!(case_updated, created);

    let (completed, reminder): (i64, i64) = conn
        .query_row("SELECT completed, reminder_days FROM deadlines WHERE id = 1", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!((completed, reminder), (0, 1));

    let tokens: (i64, i64) = conn
        .query_row("SELECT input_tokens, output_tokens FROM ai_usage_logs", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(tokens, (0, 0));
}

// ============================================================================
// Service-level restore
// ============================================================================

#[tokio::test]
async fn test_encrypted_backup_restores_and_rebuilds_search() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());
    seed(&db);
    db.rebuild_document_search_index().unwrap();

    let service =
        BackupService::new(db.clone(), tmp.path(), Arc::new(SessionSecretStore::new())).unwrap();
    service.set_password("correct horse");
    let info = service.run_now(None).await.unwrap().expect("backup should be created");
    assert!(info.path.starts_with(tmp.path().join("backups")));

    {
        let conn = db.get_connection().unwrap();
        conn.execute_batch(
            "DELETE FROM clients WHERE id = 2;
             UPDATE settings SET value = 'light' WHERE key = 'theme';
             UPDATE settings SET value = 'sk-ant-rotated' WHERE key = 'claude_api_key';",
        )
        .unwrap();
    }

    let report = service.restore(&info.filename, None).await.unwrap();
    assert!(report.search_index_rebuilt);
    assert!(report.import.search_index_stale);
    assert_eq!(report.import.skipped_sensitive, 0);

    assert_eq!(db.count_rows("clients").unwrap(), 2);
    assert_eq!(db.get_setting("theme").unwrap().as_deref(), Some("dark"));
    // live credentials are kept, not rolled back
    assert_eq!(
        db.get_setting("claude_api_key").unwrap().as_deref(),
        Some("sk-ant-rotated")
    );
    assert_eq!(search_hits(&db, "termination"), 1);
}

#[tokio::test]
async fn test_legacy_backup_restores_without_password() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());
    seed(&db);
    let service =
        BackupService::new(db.clone(), tmp.path(), Arc::new(SessionSecretStore::new())).unwrap();

    let mut legacy = DatabaseBackup::empty(Utc::now());
    legacy.clients = vec![record(json!({"id": 5, "name": "Initech"}))];
    legacy.settings = vec![
        record(json!({"key": "theme", "value": "solarized"})),
        record(json!({"key": "gemini_api_key", "value": "smuggled"})),
    ];

    let dir = service.backup_directory().unwrap();
    let name = backup_filename(legacy.created_at);
    std::fs::write(dir.join(&name), serde_json::to_vec(&legacy).unwrap()).unwrap();

    let report = service.restore(&name, None).await.unwrap();
    assert_eq!(report.import.skipped_sensitive, 1);
    assert_eq!(db.count_rows("clients").unwrap(), 1);
    assert_eq!(db.count_rows("cases").unwrap(), 0);
    assert!(db.get_setting("gemini_api_key").unwrap().is_none());
    assert_eq!(db.get_setting("openai_api_key").unwrap().as_deref(), Some("sk-live"));
}

#[tokio::test]
async fn test_restore_reloads_backup_config_from_restored_settings() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(tmp.path());
    let service =
        BackupService::new(db.clone(), tmp.path(), Arc::new(SessionSecretStore::new())).unwrap();

    let mut legacy = DatabaseBackup::empty(Utc::now());
    legacy.settings = vec![
        record(json!({"key": "backup_max_count", "value": "4"})),
        record(json!({"key": "backup_debounce_ms", "value": "not-a-number"})),
    ];
    let dir = service.backup_directory().unwrap();
    let name = backup_filename(legacy.created_at);
    std::fs::write(dir.join(&name), serde_json::to_vec(&legacy).unwrap()).unwrap();

    service.restore(&name, None).await.unwrap();
    let config = service.backup_config();
    assert_eq!(config.max_backups, 4);
    assert_eq!(config.debounce_ms, 5_000);
}
