//! State coherence: cross-field and cross-snapshot invariants.
//!
//! # Overview
//!
//! Schema validation says every field has the right shape; this module says
//! the fields agree with each other and with history:
//!
//! - **Record rules**: a committed record cannot be blocked, and cannot have
//!   a stage that is not done.
//! - **Monotonicity**: between two snapshots of a record each stage may only
//!   move forward (`pending → in_progress → done`). The one sanctioned
//!   regression is a *reopen*: every regressed stage goes back to `pending`
//!   while `git_state` becomes `uncommitted` and `blocked` becomes `false`.
//! - **Progress**: every record falls in exactly one bucket, first match wins
//!   in the order complete, blocked, in progress, pending.
//! - **Freshness**: an issue set whose linked plan is gone, or has been
//!   superseded by a newer plan, cannot be declared converged.
//!
//! Everything here is a pure function over snapshots already in memory, except
//! [`assess_freshness`] which stats the plan files it compares.

#![allow(clippy::module_name_repetitions)]

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::model::{GitState, IssueRecord, Stage, StageState};
use crate::report::{Category, Finding};
use crate::resolve::ArtifactKey;

// ---------------------------------------------------------------------------
// Record rules
// ---------------------------------------------------------------------------

/// Check the invariants that hold within a single record.
///
/// `committed` + `blocked` yields exactly one finding; `committed` with an
/// unfinished stage yields one finding per unfinished stage.
#[must_use]
pub fn check_record(record: &IssueRecord, location: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    if record.git_state != GitState::Committed {
        return findings;
    }

    if record.blocked {
        findings.push(
            Finding::error(
                Category::Coherence,
                location,
                format!("issue '{}' is committed but marked blocked", record.id),
            )
            .record(&record.id)
            .field("blocked"),
        );
    }

    for stage in Stage::ALL {
        let state = record.stage(stage);
        if state != StageState::Done {
            findings.push(
                Finding::error(
                    Category::Coherence,
                    location,
                    format!(
                        "issue '{}' is committed but {} is {state}",
                        record.id,
                        stage.field()
                    ),
                )
                .record(&record.id)
                .field(stage.field()),
            );
        }
    }

    findings
}

// ---------------------------------------------------------------------------
// Monotonicity
// ---------------------------------------------------------------------------

/// One stage moving backwards between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regression {
    pub stage: Stage,
    pub from: StageState,
    pub to: StageState,
}

impl fmt::Display for Regression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} regressed from {} to {}", self.stage, self.from, self.to)
    }
}

/// Every stage whose state went backwards, in stage order.
#[must_use]
pub fn regressions(before: &IssueRecord, after: &IssueRecord) -> Vec<Regression> {
    Stage::ALL
        .into_iter()
        .filter_map(|stage| {
            let (from, to) = (before.stage(stage), after.stage(stage));
            (to < from).then_some(Regression { stage, from, to })
        })
        .collect()
}

/// `true` when `after` is an explicit reopen of the given regressions.
#[must_use]
pub fn is_reopen(after: &IssueRecord, regressed: &[Regression]) -> bool {
    regressed.iter().all(|r| r.to == StageState::Pending)
        && after.git_state == GitState::Uncommitted
        && !after.blocked
}

/// Regressions between two snapshots of one record that are not a reopen.
///
/// An empty result means the transition is allowed.
#[must_use]
pub fn check_transition(before: &IssueRecord, after: &IssueRecord) -> Vec<Regression> {
    let regressed = regressions(before, after);
    if regressed.is_empty() || is_reopen(after, &regressed) {
        if !regressed.is_empty() {
            tracing::debug!(id = %after.id, "stage regression accepted as reopen");
        }
        return Vec::new();
    }
    regressed
}

/// Compare a baseline snapshot of an issue set against the current one.
///
/// Records may be appended, but never removed or reordered, and no record may
/// regress without a reopen.
#[must_use]
pub fn compare_snapshots(
    before: &[IssueRecord],
    after: &[IssueRecord],
    location: &str,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for old in before {
        let Some(new) = after.iter().find(|record| record.id == old.id) else {
            findings.push(
                Finding::error(
                    Category::Coherence,
                    location,
                    format!("issue '{}' was removed from the issue set", old.id),
                )
                .record(&old.id),
            );
            continue;
        };

        for regression in check_transition(old, new) {
            findings.push(
                Finding::error(
                    Category::Coherence,
                    location,
                    format!(
                        "issue '{}': {regression} without a reopen \
                         (reset to pending with git_state=uncommitted and blocked=false)",
                        old.id
                    ),
                )
                .record(&old.id)
                .field(regression.stage.field()),
            );
        }
    }

    let after_ids: HashSet<&str> = after.iter().map(|r| r.id.as_str()).collect();
    let before_ids: HashSet<&str> = before.iter().map(|r| r.id.as_str()).collect();
    let kept_before: Vec<&str> = before
        .iter()
        .map(|r| r.id.as_str())
        .filter(|id| after_ids.contains(id))
        .collect();
    let kept_after: Vec<&str> = after
        .iter()
        .map(|r| r.id.as_str())
        .filter(|id| before_ids.contains(id))
        .collect();
    if kept_before != kept_after {
        findings.push(Finding::error(
            Category::Coherence,
            location,
            "issue records were reordered; record order is canonical and must not change",
        ));
    }

    findings
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress bucket of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressClass {
    Complete,
    Blocked,
    InProgress,
    Pending,
}

/// Classify a record; first match wins.
#[must_use]
pub fn classify(record: &IssueRecord) -> ProgressClass {
    if record.is_closed_loop_complete() {
        ProgressClass::Complete
    } else if record.blocked {
        ProgressClass::Blocked
    } else if record.git_state == GitState::Committed
        || Stage::ALL
            .into_iter()
            .any(|stage| record.stage(stage) != StageState::Pending)
    {
        ProgressClass::InProgress
    } else {
        ProgressClass::Pending
    }
}

/// Aggregate progress counts. The four buckets always sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub complete: usize,
    pub blocked: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub total: usize,
}

impl Progress {
    pub fn of<'a>(records: impl IntoIterator<Item = &'a IssueRecord>) -> Self {
        let mut progress = Self::default();
        for record in records {
            progress.total += 1;
            match classify(record) {
                ProgressClass::Complete => progress.complete += 1,
                ProgressClass::Blocked => progress.blocked += 1,
                ProgressClass::InProgress => progress.in_progress += 1,
                ProgressClass::Pending => progress.pending += 1,
            }
        }
        progress
    }

    /// `true` when every record is closed-loop complete.
    #[must_use]
    pub const fn all_complete(&self) -> bool {
        self.complete == self.total
    }
}

// ---------------------------------------------------------------------------
// Freshness
// ---------------------------------------------------------------------------

/// Why an issue set is stale relative to the plans on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// `Meta.source` does not name an existing plan.
    LinkedPlanMissing { linked: PathBuf },
    /// A strictly newer plan than the linked one exists.
    NewerPlan { linked: PathBuf, latest: PathBuf },
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkedPlanMissing { linked } => write!(
                f,
                "linked plan {} does not exist; the issue set cannot be declared converged",
                linked.display()
            ),
            Self::NewerPlan { linked, latest } => write!(
                f,
                "plan {} is newer than the linked plan {}; recompile the issue set before declaring convergence",
                latest.display(),
                linked.display()
            ),
        }
    }
}

/// Compare the linked plan against the latest plan artifact.
///
/// # Errors
///
/// Returns an error if plan metadata cannot be read.
pub fn assess_freshness(linked: &Path, latest: Option<&Path>) -> io::Result<Option<Staleness>> {
    if !linked.is_file() {
        return Ok(Some(Staleness::LinkedPlanMissing {
            linked: linked.to_path_buf(),
        }));
    }
    let Some(latest) = latest else {
        return Ok(None);
    };
    if ArtifactKey::of(latest)? > ArtifactKey::of(linked)? {
        return Ok(Some(Staleness::NewerPlan {
            linked: linked.to_path_buf(),
            latest: latest.to_path_buf(),
        }));
    }
    Ok(None)
}

/// Whether a checked issue set may be declared converged.
#[must_use]
pub const fn is_converged(progress: &Progress, errors: usize, stale: bool) -> bool {
    progress.all_complete() && errors == 0 && !stale
}

// ---------------------------------------------------------------------------
// Appended records
// ---------------------------------------------------------------------------

/// Notes marker for records inserted after execution started.
pub const APPEND_ORIGIN: &str = "origin:mid_execution_append";

/// Advisory for a record appended mid-execution, naming its parent if given.
#[must_use]
pub fn appended_advisory(record: &IssueRecord, location: &str) -> Option<Finding> {
    if !record.notes.contains(APPEND_ORIGIN) {
        return None;
    }
    let parent = record
        .notes
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("parent_issue:"))
        .map(str::trim)
        .find(|parent| !parent.is_empty());

    let message = parent.map_or_else(
        || format!("issue '{}' was appended during execution", record.id),
        |parent| {
            format!(
                "issue '{}' was appended during execution (parent issue '{parent}')",
                record.id
            )
        },
    );
    Some(Finding::info(location, message).record(&record.id).field("notes"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
