//! Snapshotter
//!
//! Reads the live database into a `DatabaseBackup` and writes one back.
//!
//! Import replaces the content of every in-scope table inside a single
//! transaction. Foreign-key enforcement is switched off for the duration so
//! rows can be written in any order, and is always switched back on, whether
//! the import commits or rolls back. SQLite ignores `PRAGMA foreign_keys`
//! inside a transaction, so constraints are disabled before BEGIN and
//! restored after COMMIT/ROLLBACK; integrity is verified with
//! `PRAGMA foreign_key_check` before committing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use jurisdesk_core::snapshot::is_sensitive_setting_record;
use jurisdesk_core::{is_sensitive_setting_key, BackupTable, DatabaseBackup, Record};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult, RecoveryFailure, RecoveryStep, TransactionFailure};

/// Stages of a restore, in the order they are normally visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Idle,
    ConstraintsDisabled,
    TransactionOpen,
    Deleting,
    Inserting,
    Verifying,
    Committed,
    RollingBack,
    ConstraintsRestored,
    Failed,
}

impl std::fmt::Display for ImportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ImportStage::Idle => "idle",
            ImportStage::ConstraintsDisabled => "disabling constraints",
            ImportStage::TransactionOpen => "opening transaction",
            ImportStage::Deleting => "deleting",
            ImportStage::Inserting => "inserting",
            ImportStage::Verifying => "verifying foreign keys",
            ImportStage::Committed => "committing",
            ImportStage::RollingBack => "rolling back",
            ImportStage::ConstraintsRestored => "restoring constraints",
            ImportStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Where an import currently is; used to describe failures.
#[derive(Debug)]
struct ImportProgress {
    stage: ImportStage,
    table: Option<BackupTable>,
    row: Option<usize>,
}

impl ImportProgress {
    fn new() -> Self {
        Self {
            stage: ImportStage::Idle,
            table: None,
            row: None,
        }
    }

    fn enter(&mut self, stage: ImportStage) {
        debug!("[Snapshotter] {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
        self.table = None;
        self.row = None;
    }

    fn describe(&self) -> String {
        match (self.stage, self.table, self.row) {
            (ImportStage::Inserting, Some(table), Some(row)) => {
                format!("inserting into {} (row {})", table, row + 1)
            }
            (ImportStage::Inserting, Some(table), None) => format!("inserting into {}", table),
            (ImportStage::Deleting, Some(table), _) => format!("deleting from {}", table),
            (stage, _, _) => stage.to_string(),
        }
    }
}

/// Rows written for one table
#[derive(Debug, Clone, Serialize)]
pub struct TableImport {
    pub table: BackupTable,
    pub rows: usize,
}

/// Summary of a successful import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub tables: Vec<TableImport>,
    /// Denylisted settings rows found in the snapshot and ignored
    pub skipped_sensitive: usize,
    /// Derived indexes (full-text search) no longer match the data
    pub search_index_stale: bool,
}

impl ImportReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Exports and imports logical database snapshots
#[derive(Debug, Clone)]
pub struct Snapshotter {
    db: Database,
}

impl Snapshotter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Read every in-scope table into a fresh snapshot.
    ///
    /// All tables are read inside one deferred transaction so the snapshot
    /// is consistent even while the application keeps writing.
    pub fn export(&self) -> AppResult<DatabaseBackup> {
        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

        let mut backup = DatabaseBackup::empty(Utc::now());
        for table in BackupTable::ALL {
            *backup.table_mut(table) = read_table(&tx, table)?;
        }
        tx.commit()?;

        let stripped = backup.strip_sensitive_settings();
        if stripped > 0 {
            debug!("[Snapshotter] Excluded {} sensitive setting(s) from export", stripped);
        }

        debug!("[Snapshotter] Exported {} rows", backup.total_rows());
        Ok(backup)
    }

    /// Replace the live data with the content of `snapshot`, all or nothing.
    ///
    /// On failure the transaction is rolled back and foreign-key enforcement
    /// is switched back on; the error that aborted the import is returned,
    /// with any recovery failures attached to it.
    pub fn import(&self, snapshot: &DatabaseBackup) -> AppResult<ImportReport> {
        let mut conn = self.db.get_connection()?;
        let mut progress = ImportProgress::new();

        conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        progress.enter(ImportStage::ConstraintsDisabled);

        let outcome = run_transaction(&mut conn, snapshot, &mut progress);

        let restored = conn.execute_batch("PRAGMA foreign_keys = ON");

        match (outcome, restored) {
            (Ok(report), Ok(())) => {
                progress.enter(ImportStage::ConstraintsRestored);
                info!(
                    "[Snapshotter] Restored {} rows from snapshot created at {}",
                    report.total_rows(),
                    snapshot.created_at
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => {
                error!(
                    "[Snapshotter] Import committed but foreign keys could not be re-enabled: {}",
                    e
                );
                Err(AppError::database(format!(
                    "Restore committed but foreign-key enforcement could not be re-enabled: {}",
                    e
                )))
            }
            (Err(mut failure), restored) => {
                if let Err(e) = restored {
                    failure.recovery_failures.push(RecoveryFailure {
                        step: RecoveryStep::RestoreConstraints,
                        message: e.to_string(),
                    });
                } else {
                    progress.enter(ImportStage::ConstraintsRestored);
                }
                progress.enter(ImportStage::Failed);

                for recovery in &failure.recovery_failures {
                    error!(
                        "[Snapshotter] Recovery step {:?} failed after import error: {}",
                        recovery.step, recovery.message
                    );
                }
                warn!("[Snapshotter] {}", failure);
                Err(failure.into())
            }
        }
    }
}

fn run_transaction(
    conn: &mut Connection,
    snapshot: &DatabaseBackup,
    progress: &mut ImportProgress,
) -> Result<ImportReport, TransactionFailure> {
    let tx = conn
        .transaction()
        .map_err(|e| TransactionFailure::new(progress.describe(), e.into()))?;
    progress.enter(ImportStage::TransactionOpen);

    match replace_contents(&tx, snapshot, progress) {
        Ok(report) => {
            progress.enter(ImportStage::Committed);
            tx.commit()
                .map_err(|e| TransactionFailure::new(progress.describe(), e.into()))?;
            Ok(report)
        }
        Err(primary) => {
            let mut failure = TransactionFailure::new(progress.describe(), primary);
            progress.enter(ImportStage::RollingBack);
            if let Err(e) = tx.rollback() {
                failure.recovery_failures.push(RecoveryFailure {
                    step: RecoveryStep::Rollback,
                    message: e.to_string(),
                });
            }
            Err(failure)
        }
    }
}

fn replace_contents(
    tx: &Transaction<'_>,
    snapshot: &DatabaseBackup,
    progress: &mut ImportProgress,
) -> AppResult<ImportReport> {
    progress.enter(ImportStage::Deleting);
    for table in BackupTable::ALL.iter().rev() {
        progress.table = Some(*table);
        clear_table(tx, *table)?;
    }

    progress.enter(ImportStage::Inserting);
    let fallback_timestamp = snapshot.created_at.to_rfc3339();
    let mut report = ImportReport {
        tables: Vec::with_capacity(BackupTable::ALL.len()),
        skipped_sensitive: 0,
        search_index_stale: true,
    };

    for table in BackupTable::ALL {
        progress.table = Some(table);
        progress.row = None;
        let columns = Database::table_columns(tx, table.as_str())?;

        let mut written = 0;
        for (index, source) in snapshot.table(table).iter().enumerate() {
            progress.row = Some(index);
            if table == BackupTable::Settings && is_sensitive_setting_record(source) {
                report.skipped_sensitive += 1;
                continue;
            }

            let mut record = source.clone();
            table.fill_defaults(&mut record, &fallback_timestamp);
            if insert_record(tx, table, &columns, &record)? {
                written += 1;
            }
        }
        report.tables.push(TableImport { table, rows: written });
    }

    progress.enter(ImportStage::Verifying);
    check_foreign_keys(tx)?;

    if report.skipped_sensitive > 0 {
        warn!(
            "[Snapshotter] Ignored {} sensitive setting(s) present in the snapshot",
            report.skipped_sensitive
        );
    }
    Ok(report)
}

/// Remove all rows of a table. Credentials in the settings table are kept.
fn clear_table(conn: &Connection, table: BackupTable) -> AppResult<()> {
    if table != BackupTable::Settings {
        conn.execute(&format!("DELETE FROM \"{}\"", table.as_str()), [])?;
        return Ok(());
    }

    let keys: Vec<String> = {
        let mut stmt = conn.prepare("SELECT key FROM settings")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<_, _>>()?
    };
    for key in keys.iter().filter(|k| !is_sensitive_setting_key(k)) {
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
    }
    Ok(())
}

/// Insert one record using the columns the live schema knows about.
///
/// Returns false when the record shares no column with the table.
fn insert_record(
    conn: &Connection,
    table: BackupTable,
    columns: &[String],
    record: &Record,
) -> AppResult<bool> {
    let present: Vec<&String> = columns.iter().filter(|c| record.contains_key(*c)).collect();
    if present.is_empty() {
        return Ok(false);
    }

    let column_list = present
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=present.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        table.as_str(),
        column_list,
        placeholders
    );

    let values = present.iter().map(|c| json_to_sql(&record[c.as_str()]));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(true)
}

fn check_foreign_keys(conn: &Connection) -> AppResult<()> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let violations: Vec<(String, Option<i64>, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<_, _>>()?;

    match violations.first() {
        None => Ok(()),
        Some((table, rowid, parent)) => Err(AppError::database(format!(
            "FOREIGN KEY constraint failed: {} row {} references a missing {} row ({} violation(s))",
            table,
            rowid.map(|r| r.to_string()).unwrap_or_else(|| "?".to_string()),
            parent,
            violations.len()
        ))),
    }
}

fn read_table(conn: &Connection, table: BackupTable) -> AppResult<Vec<Record>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM \"{}\" ORDER BY rowid",
        table.as_str()
    ))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (index, name) in columns.iter().enumerate() {
            record.insert(name.clone(), sql_to_json(row.get_ref(index)?));
        }
        records.push(record);
    }
    Ok(records)
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
