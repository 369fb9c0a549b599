//! Backup File Codec Integration Tests
//!
//! Full documents with every table populated go through the production codec:
//! - encode/decode round trip
//! - wrong password and tampering are rejected
//! - legacy plaintext documents still load without a password

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use jurisdesk_core::{BackupTable, DatabaseBackup, Record};
use jurisdesk_desktop::services::backup::{classify, EnvelopeShape, SnapshotCodec};
use jurisdesk_desktop::utils::error::AppError;

// ============================================================================
// Helpers
// ============================================================================

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record must be a JSON object")
}

fn full_document() -> DatabaseBackup {
    let mut doc = DatabaseBackup::empty(Utc.with_ymd_and_hms(2024, 3, 5, 9, 15, 42).unwrap());
    doc.settings = vec![record(json!({
        "key": "theme", "value": "dark", "updated_at": "2024-03-01"
    }))];
    doc.clients = vec![record(json!({
        "id": 1, "name": "Ayşe Yılmaz", "type": "individual", "phone": null,
        "created_at": "2024-01-01 10:00:00", "updated_at": "2024-01-02 10:00:00"
    }))];
    doc.cases = vec![record(json!({
        "id": 7, "client_id": 1, "title": "Kira tespiti", "status": "active"
    }))];
    doc.document_folders = vec![record(json!({"id": 2, "name": "Dilekçeler", "case_id": 7}))];
    doc.documents = vec![record(json!({
        "id": 3, "case_id": 7, "folder_id": 2, "name": "petition.pdf",
        "path": "/docs/petition.pdf", "size": 18_234, "content_text": "lease termination"
    }))];
    doc.deadlines = vec![record(json!({
        "id": 4, "case_id": 7, "title": "Appeal", "due_date": "2024-09-01", "completed": 0
    }))];
    doc.chat_sessions = vec![record(json!({"id": 5, "title": "Research", "case_id": 7}))];
    doc.chat_messages = vec![record(json!({
        "id": 6, "session_id": 5, "role": "user", "content": "Summarize"
    }))];
    doc.chat_attachments = vec![record(json!({
        "id": 8, "message_id": 6, "document_id": 3, "name": "petition.pdf"
    }))];
    doc.activity_logs = vec![record(json!({
        "id": 9, "entity_type": "case", "entity_id": 7, "action": "create",
        "details": "{\"score\":0.75}"
    }))];
    doc.ai_usage_logs = vec![record(json!({
        "id": 10, "provider": "claude", "model": "m", "input_tokens": 1200, "output_tokens": 340
    }))];
    doc
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_round_trip_preserves_every_table() {
    let codec = SnapshotCodec::new();
    let doc = full_document();

    let bytes = codec.encode(&doc, "correct horse battery staple").unwrap();
    let decoded = codec.decode(&bytes, Some("correct horse battery staple")).unwrap();

    assert_eq!(decoded, doc);
    for table in BackupTable::ALL {
        assert_eq!(decoded.table(table).len(), 1, "table {}", table);
    }
}

#[test]
fn test_envelope_hides_plaintext_and_password() {
    let codec = SnapshotCodec::new();
    let bytes = codec.encode(&full_document(), "s3cret-pass").unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();

    assert!(!text.contains("Kira tespiti"));
    assert!(!text.contains("s3cret-pass"));

    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(classify(&value), EnvelopeShape::Encrypted);
    assert_eq!(value["format"], "jurisdesk-encrypted-backup");
    assert_eq!(value["version"], "2.0");
    assert_eq!(value["kdf"]["name"], "PBKDF2");
    assert_eq!(value["kdf"]["hash"], "SHA-256");
    assert_eq!(value["kdf"]["iterations"], 310_000);
    assert_eq!(value["cipher"]["name"], "AES-256-GCM");
}

#[test]
fn test_each_encoding_uses_fresh_salt_and_nonce() {
    let codec = SnapshotCodec::new();
    let doc = full_document();
    let a: Value = serde_json::from_slice(&codec.encode(&doc, "pw").unwrap()).unwrap();
    let b: Value = serde_json::from_slice(&codec.encode(&doc, "pw").unwrap()).unwrap();

    assert_ne!(a["kdf"]["salt"], b["kdf"]["salt"]);
    assert_ne!(a["cipher"]["nonce"], b["cipher"]["nonce"]);
    assert_ne!(a["ciphertext"], b["ciphertext"]);
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_wrong_password_fails_with_crypto_error() {
    let codec = SnapshotCodec::new();
    let bytes = codec.encode(&full_document(), "correct").unwrap();

    let err = codec.decode(&bytes, Some("wrong")).unwrap_err();
    assert!(matches!(err, AppError::Crypto(_)));
    assert_eq!(err.code(), "crypto");
}

#[test]
fn test_missing_password_for_encrypted_file() {
    let codec = SnapshotCodec::new();
    let bytes = codec.encode(&full_document(), "correct").unwrap();

    assert!(matches!(codec.decode(&bytes, None), Err(AppError::PasswordRequired)));
    assert!(matches!(codec.decode(&bytes, Some("")), Err(AppError::PasswordRequired)));
}

#[test]
fn test_tampered_ciphertext_is_rejected() {
    let codec = SnapshotCodec::new();
    let bytes = codec.encode(&full_document(), "pw").unwrap();
    let mut value: Value = serde_json::from_slice(&bytes).unwrap();

    // flip the first base64 character to another valid one
    let ciphertext = value["ciphertext"].as_str().unwrap().to_string();
    let first = if ciphertext.starts_with('A') { "B" } else { "A" };
    value["ciphertext"] = Value::String(format!("{}{}", first, &ciphertext[1..]));

    let tampered = serde_json::to_vec(&value).unwrap();
    assert!(matches!(codec.decode(&tampered, Some("pw")), Err(AppError::Crypto(_))));
}

#[test]
fn test_unsupported_envelope_version() {
    let codec = SnapshotCodec::new();
    let bytes = codec.encode(&full_document(), "pw").unwrap();
    let mut value: Value = serde_json::from_slice(&bytes).unwrap();
    value["version"] = json!("3.0");

    let err = codec.decode(&serde_json::to_vec(&value).unwrap(), Some("pw")).unwrap_err();
    assert_eq!(err.code(), "validation");
}

#[test]
fn test_garbage_is_rejected() {
    let codec = SnapshotCodec::new();
    assert!(codec.decode(b"not json at all", Some("pw")).is_err());
    assert!(codec.decode(b"[1,2,3]", None).is_err());
    assert!(codec.decode(b"{\"hello\":\"world\"}", None).is_err());
}

// ============================================================================
// Legacy compatibility
// ============================================================================

#[test]
fn test_legacy_plaintext_decodes_without_password() {
    let codec = SnapshotCodec::new();
    let doc = full_document();
    let legacy = serde_json::to_vec(&doc).unwrap();

    assert_eq!(codec.decode(&legacy, None).unwrap(), doc);
    // a supplied password is simply unused
    assert_eq!(codec.decode(&legacy, Some("ignored")).unwrap(), doc);
}

#[test]
fn test_legacy_document_with_missing_tables() {
    let codec = SnapshotCodec::new();
    let legacy = json!({
        "version": "1.0",
        "created_at": "2023-06-01T08:00:00Z",
        "clients": [{"id": 1, "name": "Acme"}]
    });

    let doc = codec.decode(&serde_json::to_vec(&legacy).unwrap(), None).unwrap();
    assert_eq!(doc.clients.len(), 1);
    assert!(doc.cases.is_empty());
    assert!(doc.ai_usage_logs.is_empty());
}
