//! Path Guard
//!
//! Boundary checks for backup directories and filenames. A custom backup
//! directory is only honoured when it is the application data root or lies
//! below it, and only files following the automatic-backup naming scheme may
//! be read or deleted.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::{CoreError, CoreResult};

/// Filename prefix of automatic backups
pub const BACKUP_FILE_PREFIX: &str = "jurisdesk_auto_";

/// Filename extension of automatic backups
pub const BACKUP_FILE_EXTENSION: &str = "json";

const MAX_FILENAME_LEN: usize = 255;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^jurisdesk_auto_\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}-\d{3}Z\.json$")
            .expect("backup filename pattern is valid")
    })
}

/// Check that `candidate` is `root` itself or a directory below it.
///
/// See [`resolve_within_root`] for how both sides are normalized.
pub fn is_within_root(candidate: &Path, root: &Path) -> bool {
    resolve_within_root(candidate, root).is_some()
}

/// Resolve `candidate` and return it if it is `root` or lies below it.
///
/// Both sides are normalized first: backslashes are treated as separators,
/// symlinks are followed component by component, and `..` pops the
/// physical parent of what has been resolved so far, as the kernel would.
/// Case is folded on case-insensitive platforms for the comparison only.
/// The comparison is component-wise, so `/data/app_malicious` is not inside
/// `/data/app`. Relative candidates are rejected.
///
/// Callers must use the returned path for filesystem access; the raw
/// candidate may still contain `..` segments behind symlinks.
pub fn resolve_within_root(candidate: &Path, root: &Path) -> Option<PathBuf> {
    let candidate = unify_separators(candidate);
    let root = unify_separators(root);

    if !candidate.is_absolute() || !root.is_absolute() {
        return None;
    }

    let resolved = resolve(&candidate);
    let folded = fold_case(&resolved);
    let root = fold_case(&resolve(&root));

    (folded == root || folded.starts_with(&root)).then_some(resolved)
}

/// Check that `name` is a plain automatic-backup filename.
pub fn is_valid_backup_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FILENAME_LEN {
        return false;
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return false;
    }
    filename_pattern().is_match(name)
}

/// Build the automatic-backup filename for a point in time.
///
/// Colons and the fractional separator of the ISO-8601 timestamp become
/// hyphens, e.g. `jurisdesk_auto_2024-01-15T10-30-00-123Z.json`.
pub fn backup_filename(at: DateTime<Utc>) -> String {
    format!(
        "{}{}.{}",
        BACKUP_FILE_PREFIX,
        at.format(TIMESTAMP_FORMAT),
        BACKUP_FILE_EXTENSION
    )
}

/// Recover the timestamp embedded in a backup filename.
pub fn parse_backup_timestamp(name: &str) -> CoreResult<DateTime<Utc>> {
    if !is_valid_backup_filename(name) {
        return Err(CoreError::validation(format!("Invalid backup filename: {}", name)));
    }

    let stamp = &name[BACKUP_FILE_PREFIX.len()..name.len() - BACKUP_FILE_EXTENSION.len() - 1];
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| CoreError::parse(format!("Invalid timestamp in {}: {}", name, e)))
}

fn unify_separators(path: &Path) -> PathBuf {
    if cfg!(windows) {
        path.to_path_buf()
    } else {
        PathBuf::from(path.to_string_lossy().replace('\\', "/"))
    }
}

/// Walk `path` one component at a time, canonicalizing the prefix built so
/// far while it exists, so `link/..` lands next to the link target.
fn resolve(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // Popping at the root is a no-op, like the OS does.
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => {
                out.push(name);
                if let Ok(canonical) = std::fs::canonicalize(&out) {
                    out = canonical;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn fold_case(path: &Path) -> PathBuf {
    if cfg!(any(windows, target_os = "macos")) {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}
