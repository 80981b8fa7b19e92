//! Crash recovery for issue-set files.
//!
//! An update writes `<file>.tmp`, copies the original to `<file>.bak`, then
//! renames the temp file over the original. A crash can interrupt that
//! sequence at any point; [`recover`] inspects which of the three files exist
//! and restores one of exactly two states: pre-mutation or fully
//! post-mutation.
//!
//! | original | temp | backup | action |
//! |----------|------|--------|--------|
//! | yes | yes | any | rename never happened: discard temp |
//! | yes | no  | any | nothing to do |
//! | no  | valid | any | promote temp |
//! | no  | invalid | yes | restore backup, discard temp |
//!
//! A temp file is valid when every non-blank line is a JSON object, its
//! record count matches the Meta `total_issues`, and its line count matches
//! the backup's. An update never adds or removes lines, so a temp cut at a
//! line break is caught by the counts even though each line still parses.
//! | no  | no  | yes | restore backup |
//! | no  | invalid | no | unrecoverable |
//!
//! Recovery runs before every store read. It is deterministic and never
//! deletes the backup.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ErrorCode;
use crate::jsonl;

// ---------------------------------------------------------------------------
// Sibling paths
// ---------------------------------------------------------------------------

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Staging path for an update of `path`: `<file>.tmp` in the same directory,
/// so the final rename never crosses a filesystem boundary.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// Backup path for `path`: `<file>.bak`.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The action taken during recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The original is intact and no update was in flight.
    NoActionNeeded,
    /// An update crashed before its rename; the stale temp file was removed.
    DiscardedTemp { temp: PathBuf },
    /// The original was missing and a valid temp file took its place.
    PromotedTemp { temp: PathBuf },
    /// The original was restored from the backup.
    RestoredBackup { backup: PathBuf },
}

impl RecoveryAction {
    /// `true` when recovery changed anything on disk.
    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self, Self::NoActionNeeded)
    }
}

/// Errors that can occur during recovery.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// I/O error during recovery.
    #[error("recovery I/O error: {0}")]
    Io(#[from] io::Error),

    /// None of the original, temp, or backup files exist.
    #[error("issue set not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The original is gone, the temp file is invalid, and no backup exists.
    #[error("issue set {} is missing and no valid temp or backup file exists", .0.display())]
    Unrecoverable(PathBuf),
}

impl RecoveryError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::WriteFailed,
            Self::NotFound(_) => ErrorCode::ArtifactUnreadable,
            Self::Unrecoverable(_) => ErrorCode::Unrecoverable,
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Bring `path` back to a consistent state after a possible crash.
///
/// # Errors
///
/// Returns [`RecoveryError::NotFound`] if nothing exists at all,
/// [`RecoveryError::Unrecoverable`] if only an invalid temp file remains, and
/// [`RecoveryError::Io`] on filesystem failures.
pub fn recover(path: &Path) -> Result<RecoveryAction, RecoveryError> {
    let temp = temp_path(path);
    let backup = backup_path(path);

    if path.exists() {
        if !temp.exists() {
            return Ok(RecoveryAction::NoActionNeeded);
        }
        fs::remove_file(&temp)?;
        tracing::warn!(
            path = %path.display(),
            temp = %temp.display(),
            "interrupted update discarded: original kept"
        );
        return Ok(RecoveryAction::DiscardedTemp { temp });
    }

    if temp.exists() {
        if is_promotable(&temp, &backup) {
            fs::rename(&temp, path)?;
            tracing::warn!(
                path = %path.display(),
                temp = %temp.display(),
                "interrupted update completed: temp promoted"
            );
            return Ok(RecoveryAction::PromotedTemp { temp });
        }
        if !backup.exists() {
            return Err(RecoveryError::Unrecoverable(path.to_path_buf()));
        }
        restore_backup(path, &backup, &temp)?;
        tracing::warn!(
            path = %path.display(),
            backup = %backup.display(),
            "invalid temp discarded: original restored from backup"
        );
        return Ok(RecoveryAction::RestoredBackup { backup });
    }

    if backup.exists() {
        restore_backup(path, &backup, &temp)?;
        tracing::warn!(
            path = %path.display(),
            backup = %backup.display(),
            "original restored from backup"
        );
        return Ok(RecoveryAction::RestoredBackup { backup });
    }

    Err(RecoveryError::NotFound(path.to_path_buf()))
}

/// Copy the backup into the temp slot, then rename it over the original, so
/// the backup itself is never consumed.
fn restore_backup(path: &Path, backup: &Path, temp: &Path) -> io::Result<()> {
    fs::copy(backup, temp)?;
    fs::rename(temp, path)
}

/// Line counts of an issue file that parses line by line.
struct Shape {
    /// Non-blank lines, Meta included.
    lines: usize,
    /// `total_issues` declared by the Meta line, if any.
    declared: Option<u64>,
}

impl Shape {
    fn of(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let lines = match jsonl::validate(&content) {
            Ok(lines) => lines,
            Err((line, e)) => {
                tracing::debug!(path = %path.display(), line, error = %e, "issue file is invalid");
                return None;
            }
        };
        let declared = jsonl::records(&content)
            .next()
            .and_then(|meta| jsonl::parse_object(meta.text).ok())
            .and_then(|meta| meta.get("total_issues").and_then(Value::as_u64));
        Some(Self { lines, declared })
    }

    /// `true` when the Meta `total_issues` agrees with the record lines.
    fn is_consistent(&self) -> bool {
        self.declared
            .is_none_or(|declared| usize::try_from(declared).ok() == Some(self.lines.saturating_sub(1)))
    }
}

/// A temp file may replace a missing original when it parses, its record
/// count is consistent, and it has as many lines as the backup.
fn is_promotable(temp: &Path, backup: &Path) -> bool {
    let Some(shape) = Shape::of(temp) else {
        return false;
    };
    if shape.lines == 0 {
        return false;
    }
    if !shape.is_consistent() {
        tracing::debug!(
            temp = %temp.display(),
            lines = shape.lines,
            declared = ?shape.declared,
            "temp record count disagrees with total_issues"
        );
        return false;
    }
    let expected = backup.exists().then(|| Shape::of(backup)).flatten().map(|b| b.lines);
    if let Some(expected) = expected.filter(|&expected| expected != shape.lines) {
        tracing::debug!(
            temp = %temp.display(),
            lines = shape.lines,
            expected,
            "temp line count differs from backup"
        );
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const OLD: &str = "{\"type\":\"meta\"}\n{\"id\":\"A\",\"dev_state\":\"pending\"}\n";
    const NEW: &str = "{\"type\":\"meta\"}\n{\"id\":\"A\",\"dev_state\":\"done\"}\n";

    fn setup() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        (dir, path)
    }

    #[test]
    fn sibling_names() {
        let path = Path::new("/x/docs/issues/2026-01-01-auth.jsonl");
        assert_eq!(temp_path(path), PathBuf::from("/x/docs/issues/2026-01-01-auth.jsonl.tmp"));
        assert_eq!(backup_path(path), PathBuf::from("/x/docs/issues/2026-01-01-auth.jsonl.bak"));
    }

    #[test]
    fn clean_file_needs_nothing() {
        let (_dir, path) = setup();
        fs::write(&path, OLD).unwrap();
        assert_eq!(recover(&path).unwrap(), RecoveryAction::NoActionNeeded);
    }

    #[test]
    fn temp_next_to_original_is_discarded() {
        let (_dir, path) = setup();
        fs::write(&path, OLD).unwrap();
        fs::write(temp_path(&path), NEW).unwrap();

        let action = recover(&path).unwrap();
        assert!(matches!(action, RecoveryAction::DiscardedTemp { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), OLD);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn valid_temp_without_original_is_promoted() {
        let (_dir, path) = setup();
        fs::write(temp_path(&path), NEW).unwrap();
        fs::write(backup_path(&path), OLD).unwrap();

        let action = recover(&path).unwrap();
        assert!(matches!(action, RecoveryAction::PromotedTemp { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), NEW);
    }

    #[test]
    fn truncated_temp_falls_back_to_backup() {
        let (_dir, path) = setup();
        fs::write(temp_path(&path), &NEW[..NEW.len() - 8]).unwrap();
        fs::write(backup_path(&path), OLD).unwrap();

        let action = recover(&path).unwrap();
        assert!(matches!(action, RecoveryAction::RestoredBackup { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), OLD);
        assert!(backup_path(&path).exists(), "backup is retained");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn temp_cut_at_line_break_falls_back_to_backup() {
        let (_dir, path) = setup();
        let full = "{\"type\":\"meta\",\"total_issues\":2}\n{\"id\":\"A\"}\n{\"id\":\"B\"}\n";
        let cut = "{\"type\":\"meta\",\"total_issues\":2}\n{\"id\":\"A\"}\n";
        fs::write(backup_path(&path), full).unwrap();
        fs::write(temp_path(&path), cut).unwrap();

        let action = recover(&path).unwrap();
        assert!(matches!(action, RecoveryAction::RestoredBackup { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), full);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn temp_with_fewer_lines_than_backup_is_not_promoted() {
        let (_dir, path) = setup();
        fs::write(backup_path(&path), OLD).unwrap();
        fs::write(temp_path(&path), "{\"type\":\"meta\"}\n").unwrap();

        let action = recover(&path).unwrap();
        assert!(matches!(action, RecoveryAction::RestoredBackup { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), OLD);
    }

    #[test]
    fn temp_disagreeing_with_total_issues_is_unrecoverable_alone() {
        let (_dir, path) = setup();
        fs::write(temp_path(&path), "{\"type\":\"meta\",\"total_issues\":2}\n{\"id\":\"A\"}\n").unwrap();
        let err = recover(&path).unwrap_err();
        assert!(matches!(err, RecoveryError::Unrecoverable(_)));
        assert!(temp_path(&path).exists(), "the only copy is left in place");
    }

    #[test]
    fn backup_alone_is_restored() {
        let (_dir, path) = setup();
        fs::write(backup_path(&path), OLD).unwrap();
        let action = recover(&path).unwrap();
        assert!(action.changed());
        assert_eq!(fs::read_to_string(&path).unwrap(), OLD);
    }

    #[test]
    fn invalid_temp_without_backup_is_unrecoverable() {
        let (_dir, path) = setup();
        fs::write(temp_path(&path), "{\"type\":").unwrap();
        let err = recover(&path).unwrap_err();
        assert!(matches!(err, RecoveryError::Unrecoverable(_)));
        assert_eq!(err.error_code(), ErrorCode::Unrecoverable);
    }

    #[test]
    fn nothing_on_disk_is_not_found() {
        let (_dir, path) = setup();
        assert!(matches!(recover(&path).unwrap_err(), RecoveryError::NotFound(_)));
    }
}
