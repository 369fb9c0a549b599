//! Snapshot Document Model
//!
//! The logical database snapshot written into every backup file. Records are
//! kept as untyped JSON objects so that a backup produced by one schema
//! version can still be read by another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current document format version.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// A single table row, keyed by column name.
pub type Record = Map<String, Value>;

/// Settings keys that hold credentials and must never leave the live store.
pub const SENSITIVE_SETTING_KEYS: &[&str] = &[
    "api_key",
    "claude_api_key",
    "anthropic_api_key",
    "openai_api_key",
    "gemini_api_key",
    "deepseek_api_key",
];

/// Returns true if a settings key is denylisted for backups.
pub fn is_sensitive_setting_key(key: &str) -> bool {
    SENSITIVE_SETTING_KEYS.contains(&key) || key.ends_with("_api_key")
}

/// Returns true if a settings record carries a denylisted key.
pub fn is_sensitive_setting_record(record: &Record) -> bool {
    record
        .get("key")
        .and_then(Value::as_str)
        .map(is_sensitive_setting_key)
        .unwrap_or(false)
}

/// Tables covered by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTable {
    Settings,
    Clients,
    Cases,
    DocumentFolders,
    Documents,
    Deadlines,
    ChatSessions,
    ChatMessages,
    ChatAttachments,
    ActivityLogs,
    AiUsageLogs,
}

impl BackupTable {
    /// Every table, parents before children.
    pub const ALL: [BackupTable; 11] = [
        BackupTable::Settings,
        BackupTable::Clients,
        BackupTable::Cases,
        BackupTable::DocumentFolders,
        BackupTable::Documents,
        BackupTable::Deadlines,
        BackupTable::ChatSessions,
        BackupTable::ChatMessages,
        BackupTable::ChatAttachments,
        BackupTable::ActivityLogs,
        BackupTable::AiUsageLogs,
    ];

    /// SQL table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupTable::Settings => "settings",
            BackupTable::Clients => "clients",
            BackupTable::Cases => "cases",
            BackupTable::DocumentFolders => "document_folders",
            BackupTable::Documents => "documents",
            BackupTable::Deadlines => "deadlines",
            BackupTable::ChatSessions => "chat_sessions",
            BackupTable::ChatMessages => "chat_messages",
            BackupTable::ChatAttachments => "chat_attachments",
            BackupTable::ActivityLogs => "activity_logs",
            BackupTable::AiUsageLogs => "ai_usage_logs",
        }
    }

    /// Whether rows of this table carry an `updated_at` column.
    fn has_updated_at(&self) -> bool {
        matches!(
            self,
            BackupTable::Settings
                | BackupTable::Clients
                | BackupTable::Cases
                | BackupTable::Documents
                | BackupTable::ChatSessions
        )
    }

    /// Integer columns that older backups may omit.
    fn integer_defaults(&self) -> &'static [(&'static str, i64)] {
        match self {
            BackupTable::Deadlines => &[("completed", 0), ("reminder_days", 1)],
            BackupTable::AiUsageLogs => &[("input_tokens", 0), ("output_tokens", 0)],
            BackupTable::Documents => &[("size", 0)],
            _ => &[],
        }
    }

    /// Fill fields absent from older backups with deterministic defaults.
    ///
    /// `fallback_timestamp` is used when a row has no `created_at` of its
    /// own; callers pass the snapshot's creation time so the result does not
    /// depend on when the restore runs.
    pub fn fill_defaults(&self, record: &mut Record, fallback_timestamp: &str) {
        let settings_row = matches!(self, BackupTable::Settings);

        if !settings_row && is_missing(record, "created_at") {
            record.insert(
                "created_at".to_string(),
                Value::String(fallback_timestamp.to_string()),
            );
        }

        if self.has_updated_at() && is_missing(record, "updated_at") {
            let created = record
                .get("created_at")
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::String(fallback_timestamp.to_string()));
            record.insert("updated_at".to_string(), created);
        }

        for (column, default) in self.integer_defaults() {
            if is_missing(record, column) {
                record.insert((*column).to_string(), Value::from(*default));
            }
        }
    }
}

impl std::fmt::Display for BackupTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_missing(record: &Record, column: &str) -> bool {
    record.get(column).map(Value::is_null).unwrap_or(true)
}

/// Full logical snapshot of the application database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseBackup {
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub clients: Vec<Record>,
    #[serde(default)]
    pub cases: Vec<Record>,
    #[serde(default)]
    pub documents: Vec<Record>,
    #[serde(default)]
    pub deadlines: Vec<Record>,
    #[serde(default)]
    pub chat_sessions: Vec<Record>,
    #[serde(default)]
    pub chat_messages: Vec<Record>,
    #[serde(default)]
    pub chat_attachments: Vec<Record>,
    #[serde(default)]
    pub document_folders: Vec<Record>,
    #[serde(default)]
    pub activity_logs: Vec<Record>,
    #[serde(default)]
    pub ai_usage_logs: Vec<Record>,
    #[serde(default)]
    pub settings: Vec<Record>,
}

impl DatabaseBackup {
    /// Create an empty snapshot stamped with the given time.
    pub fn empty(created_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            created_at,
            clients: Vec::new(),
            cases: Vec::new(),
            documents: Vec::new(),
            deadlines: Vec::new(),
            chat_sessions: Vec::new(),
            chat_messages: Vec::new(),
            chat_attachments: Vec::new(),
            document_folders: Vec::new(),
            activity_logs: Vec::new(),
            ai_usage_logs: Vec::new(),
            settings: Vec::new(),
        }
    }

    /// Rows of one table.
    pub fn table(&self, table: BackupTable) -> &[Record] {
        match table {
            BackupTable::Settings => &self.settings,
            BackupTable::Clients => &self.clients,
            BackupTable::Cases => &self.cases,
            BackupTable::DocumentFolders => &self.document_folders,
            BackupTable::Documents => &self.documents,
            BackupTable::Deadlines => &self.deadlines,
            BackupTable::ChatSessions => &self.chat_sessions,
            BackupTable::ChatMessages => &self.chat_messages,
            BackupTable::ChatAttachments => &self.chat_attachments,
            BackupTable::ActivityLogs => &self.activity_logs,
            BackupTable::AiUsageLogs => &self.ai_usage_logs,
        }
    }

    /// Mutable rows of one table.
    pub fn table_mut(&mut self, table: BackupTable) -> &mut Vec<Record> {
        match table {
            BackupTable::Settings => &mut self.settings,
            BackupTable::Clients => &mut self.clients,
            BackupTable::Cases => &mut self.cases,
            BackupTable::DocumentFolders => &mut self.document_folders,
            BackupTable::Documents => &mut self.documents,
            BackupTable::Deadlines => &mut self.deadlines,
            BackupTable::ChatSessions => &mut self.chat_sessions,
            BackupTable::ChatMessages => &mut self.chat_messages,
            BackupTable::ChatAttachments => &mut self.chat_attachments,
            BackupTable::ActivityLogs => &mut self.activity_logs,
            BackupTable::AiUsageLogs => &mut self.ai_usage_logs,
        }
    }

    /// Drop every denylisted settings row. Returns how many were removed.
    pub fn strip_sensitive_settings(&mut self) -> usize {
        let before = self.settings.len();
        self.settings.retain(|row| !is_sensitive_setting_record(row));
        before - self.settings.len()
    }

    /// Total number of rows across all tables.
    pub fn total_rows(&self) -> usize {
        BackupTable::ALL.iter().map(|t| self.table(*t).len()).sum()
    }
}
