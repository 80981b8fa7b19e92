//! Crash-safe single-record updates of an issue-set file.
//!
//! # Overview
//!
//! An update is split into two steps so every crash point can be exercised:
//!
//! 1. [`IssueStore::stage`] reads the file, locates the target record,
//!    applies the typed [`FieldUpdate`]s, re-serializes that one line, and
//!    writes the full content to `<file>.tmp`. The temp file is then read back
//!    and validated: every line is a JSON object and the line count is
//!    unchanged.
//! 2. [`IssueStore::commit`] copies the original to `<file>.bak` and renames
//!    the temp file over the original in one step.
//!
//! Every byte outside the target line, terminators included, is copied
//! through unchanged, and line order is never touched.
//!
//! # Design
//!
//! - **Recover first**: [`IssueStore::update`] runs [`recovery::recover`]
//!   before reading, so a crashed predecessor never leaks into a new update.
//! - **Monotonic**: a stage may only move backwards as part of a reopen. A
//!   rejected update writes nothing.
//! - **Single driver**: there is no lock; at most one process mutates a file.

#![allow(clippy::module_name_repetitions)]

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::coherence::{Regression, check_transition};
use crate::error::ErrorCode;
use crate::jsonl;
use crate::model::{GitState, IssueRecord, Stage, StageState};
use crate::recovery::{self, RecoveryAction, RecoveryError, backup_path, temp_path};

// ---------------------------------------------------------------------------
// Field updates
// ---------------------------------------------------------------------------

/// One mutation of an issue record. `id` is immutable and has no variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Stage(Stage, StageState),
    GitState(GitState),
    Blocked(bool),
    Owner(String),
    Notes(String),
}

/// Fields accepted by [`FieldUpdate::from_str`].
pub const UPDATABLE_FIELDS: [&str; 7] = [
    "dev_state",
    "review_initial_state",
    "review_regression_state",
    "git_state",
    "blocked",
    "owner",
    "notes",
];

impl FieldUpdate {
    /// Name of the field this update writes.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::Stage(stage, _) => stage.field(),
            Self::GitState(_) => "git_state",
            Self::Blocked(_) => "blocked",
            Self::Owner(_) => "owner",
            Self::Notes(_) => "notes",
        }
    }

    pub fn apply(&self, record: &mut IssueRecord) {
        match self {
            Self::Stage(stage, state) => *record.stage_mut(*stage) = *state,
            Self::GitState(state) => record.git_state = *state,
            Self::Blocked(blocked) => record.blocked = *blocked,
            Self::Owner(owner) => record.owner.clone_from(owner),
            Self::Notes(notes) => record.notes.clone_from(notes),
        }
    }
}

impl fmt::Display for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(_, state) => write!(f, "{}={state}", self.field()),
            Self::GitState(state) => write!(f, "git_state={state}"),
            Self::Blocked(blocked) => write!(f, "blocked={blocked}"),
            Self::Owner(value) | Self::Notes(value) => write!(f, "{}={value}", self.field()),
        }
    }
}

/// A `field=value` argument that does not describe a valid update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidUpdate(pub String);

impl FromStr for FieldUpdate {
    type Err = InvalidUpdate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((field, value)) = s.split_once('=') else {
            return Err(InvalidUpdate(format!("expected field=value, got '{s}'")));
        };
        let field = field.trim();
        let stage = |stage: Stage| {
            value
                .parse::<StageState>()
                .map(|state| Self::Stage(stage, state))
                .map_err(|e| InvalidUpdate(e.to_string()))
        };

        match field {
            "dev_state" => stage(Stage::Dev),
            "review_initial_state" => stage(Stage::ReviewInitial),
            "review_regression_state" => stage(Stage::ReviewRegression),
            "git_state" => value
                .parse::<GitState>()
                .map(Self::GitState)
                .map_err(|e| InvalidUpdate(e.to_string())),
            "blocked" => match value.trim() {
                "true" => Ok(Self::Blocked(true)),
                "false" => Ok(Self::Blocked(false)),
                other => Err(InvalidUpdate(format!("invalid blocked: '{other}' (expected true or false)"))),
            },
            "owner" => Ok(Self::Owner(value.to_string())),
            "notes" => Ok(Self::Notes(value.to_string())),
            "id" => Err(InvalidUpdate("field 'id' is immutable".to_string())),
            other => Err(InvalidUpdate(format!(
                "field '{other}' cannot be updated (expected one of: {})",
                UPDATABLE_FIELDS.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error("{}:{line}: {message}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("issue '{id}' not found in {}", .path.display())]
    RecordNotFound { path: PathBuf, id: String },

    #[error("invalid update: {0}")]
    InvalidUpdate(#[from] InvalidUpdate),

    #[error("issue '{id}': {}", describe_regressions(.regressions))]
    InvalidTransition { id: String, regressions: Vec<Regression> },

    #[error("staged file {} failed validation: {message}", .path.display())]
    TempValidation { path: PathBuf, message: String },
}

fn describe_regressions(regressions: &[Regression]) -> String {
    let list: Vec<String> = regressions.iter().map(ToString::to_string).collect();
    format!(
        "{} without a reopen (reset to pending with git_state=uncommitted and blocked=false)",
        list.join(", ")
    )
}

impl StoreError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::ArtifactUnreadable,
            Self::Write { .. } => ErrorCode::WriteFailed,
            Self::Recovery(e) => e.error_code(),
            Self::Malformed { .. } => ErrorCode::MalformedArtifact,
            Self::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            Self::InvalidUpdate(_) => ErrorCode::InvalidUpdate,
            Self::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            Self::TempValidation { .. } => ErrorCode::TempValidationFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// An update written to the temp file and validated, not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpdate {
    pub temp: PathBuf,
    /// Physical line of the updated record.
    pub line: usize,
    pub before: IssueRecord,
    pub after: IssueRecord,
}

/// Result of a committed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub line: usize,
    pub before: IssueRecord,
    pub after: IssueRecord,
    pub backup: PathBuf,
    /// Recovery performed before the update, if any.
    pub recovery: RecoveryAction,
}

impl UpdateOutcome {
    /// `true` when the record actually changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Handle on one issue-set file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueStore {
    path: PathBuf,
}

impl IssueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the recovery protocol on this file.
    ///
    /// # Errors
    ///
    /// See [`recovery::recover`].
    pub fn recover(&self) -> Result<RecoveryAction, RecoveryError> {
        recovery::recover(&self.path)
    }

    /// Recover, stage, and commit one update.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if recovery fails, the record cannot be
    /// found or updated, or the file cannot be written. On error the
    /// original file is unchanged.
    pub fn update(&self, id: &str, updates: &[FieldUpdate]) -> Result<UpdateOutcome, StoreError> {
        let recovery = self.recover()?;
        let staged = self.stage(id, updates)?;
        let mut outcome = self.commit(staged)?;
        outcome.recovery = recovery;
        Ok(outcome)
    }

    /// First step: apply `updates` to record `id` and write a validated temp
    /// file. The original is not touched.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on read failures, malformed content, an
    /// unknown id, a regressing update, or a temp file that fails validation.
    pub fn stage(&self, id: &str, updates: &[FieldUpdate]) -> Result<StagedUpdate, StoreError> {
        let bytes = fs::read(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|_| StoreError::Malformed {
            path: self.path.clone(),
            line: 0,
            message: "file is not valid UTF-8".to_string(),
        })?;

        let expected = jsonl::validate(&content).map_err(|(line, e)| StoreError::Malformed {
            path: self.path.clone(),
            line,
            message: e.to_string(),
        })?;

        let lines = jsonl::lines(&content);
        let (target, before) = self.locate(&lines, id)?;

        let mut after = before.clone();
        for update in updates {
            update.apply(&mut after);
        }
        let regressions = check_transition(&before, &after);
        if !regressions.is_empty() {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                regressions,
            });
        }

        let replacement = serde_json::to_string(&after).map_err(|e| StoreError::Malformed {
            path: self.path.clone(),
            line: target,
            message: e.to_string(),
        })?;

        let mut updated = String::with_capacity(content.len() + replacement.len());
        for line in &lines {
            updated.push_str(if line.number == target { replacement.as_str() } else { line.text });
            updated.push_str(line.terminator);
        }

        let temp = temp_path(&self.path);
        self.write_temp(&temp, &updated)?;
        validate_temp(&temp, expected)?;

        tracing::debug!(path = %self.path.display(), id, line = target, "update staged");
        Ok(StagedUpdate {
            temp,
            line: target,
            before,
            after,
        })
    }

    /// Second step: back up the original and rename the staged file over it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the backup copy or the rename fails.
    pub fn commit(&self, staged: StagedUpdate) -> Result<UpdateOutcome, StoreError> {
        let backup = backup_path(&self.path);
        fs::copy(&self.path, &backup).map_err(|source| StoreError::Write {
            path: backup.clone(),
            source,
        })?;
        fs::rename(&staged.temp, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(
            path = %self.path.display(),
            id = %staged.after.id,
            line = staged.line,
            "issue record updated"
        );
        Ok(UpdateOutcome {
            line: staged.line,
            before: staged.before,
            after: staged.after,
            backup,
            recovery: RecoveryAction::NoActionNeeded,
        })
    }

    /// Find the one record line carrying `id` and parse it.
    fn locate(&self, lines: &[jsonl::Line<'_>], id: &str) -> Result<(usize, IssueRecord), StoreError> {
        let mut found: Option<(usize, IssueRecord)> = None;
        // The first non-blank line is the Meta header.
        for line in lines.iter().filter(|line| !line.is_blank()).skip(1) {
            let malformed = |message: String| StoreError::Malformed {
                path: self.path.clone(),
                line: line.number,
                message,
            };
            let obj = jsonl::parse_object(line.text).map_err(|e| malformed(e.to_string()))?;
            if obj.get("id").and_then(serde_json::Value::as_str) != Some(id) {
                continue;
            }
            if found.is_some() {
                return Err(malformed(format!("duplicate issue id '{id}'")));
            }
            let record = serde_json::from_value::<IssueRecord>(serde_json::Value::Object(obj))
                .map_err(|e| malformed(format!("issue '{id}' does not match the issue schema: {e}")))?;
            found = Some((line.number, record));
        }

        found.ok_or_else(|| StoreError::RecordNotFound {
            path: self.path.clone(),
            id: id.to_string(),
        })
    }

    fn write_temp(&self, temp: &Path, content: &str) -> Result<(), StoreError> {
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(temp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()
        };
        write().map_err(|source| StoreError::Write {
            path: temp.to_path_buf(),
            source,
        })
    }
}

/// Read the staged file back and check it. An invalid temp file is removed.
fn validate_temp(temp: &Path, expected: usize) -> Result<(), StoreError> {
    let outcome = match fs::read_to_string(temp) {
        Err(e) => Err(e.to_string()),
        Ok(content) => match jsonl::validate(&content) {
            Ok(count) if count == expected => Ok(()),
            Ok(count) => Err(format!("line count changed from {expected} to {count}")),
            Err((line, e)) => Err(format!("line {line}: {e}")),
        },
    };

    outcome.map_err(|message| {
        if let Err(e) = fs::remove_file(temp) {
            tracing::warn!(temp = %temp.display(), error = %e, "failed to remove invalid temp file");
        }
        StoreError::TempValidation {
            path: temp.to_path_buf(),
            message,
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
