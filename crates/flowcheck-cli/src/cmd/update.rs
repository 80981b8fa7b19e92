//! `flowcheck update`: apply field updates to one issue record through the
//! crash-safe store.
//!
//! Recovery always runs first. Updates are given as repeated `--set
//! field=value` arguments and applied in order; a regressing stage change is
//! rejected unless the same call reopens the record.
//!
//! # Updatable fields
//! - `dev_state`, `review_initial_state`, `review_regression_state` (pending|in_progress|done)
//! - `git_state` (uncommitted|committed)
//! - `blocked` (true|false)
//! - `owner`, `notes` (free text)

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use flowcheck_core::recovery::RecoveryAction;
use flowcheck_core::report::ExitStatus;
use flowcheck_core::resolve::resolve_under;
use flowcheck_core::store::{FieldUpdate, IssueStore};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `flowcheck update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Issue set to modify.
    #[arg(long)]
    pub issues: PathBuf,

    /// Id of the record to update.
    #[arg(long)]
    pub id: String,

    /// Field update as `field=value`; repeat for several fields.
    #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
    pub updates: Vec<FieldUpdate>,

    /// Project root; a relative `--issues` path resolves under it.
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,
}

/// One field change in the output.
#[derive(Debug, Serialize)]
struct FieldChange {
    field: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct UpdateOutput {
    path: String,
    id: String,
    line: usize,
    changed: bool,
    applied: Vec<FieldChange>,
    backup: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    recovered: Option<String>,
}

/// Execute `flowcheck update`.
///
/// # Errors
///
/// Returns an error if recovery fails, the record is missing, the update is
/// rejected, or the file cannot be written. The original is left intact.
pub fn run_update(args: &UpdateArgs, output: OutputMode) -> anyhow::Result<ExitStatus> {
    let path = resolve_under(&args.project_root, &args.issues);
    let store = IssueStore::new(&path);
    let outcome = store
        .update(&args.id, &args.updates)
        .with_context(|| format!("Failed to update '{}' in {}", args.id, path.display()))?;

    let payload = UpdateOutput {
        path: path.display().to_string(),
        id: args.id.clone(),
        line: outcome.line,
        changed: outcome.changed(),
        applied: args
            .updates
            .iter()
            .map(|update| {
                let rendered = update.to_string();
                FieldChange {
                    field: update.field(),
                    value: rendered
                        .split_once('=')
                        .map_or_else(String::new, |(_, value)| value.to_string()),
                }
            })
            .collect(),
        backup: outcome.backup.display().to_string(),
        recovered: describe_recovery(&outcome.recovery),
    };
    render_mode(output, &payload, render_update_text, render_update_pretty)?;
    Ok(ExitStatus::Pass)
}

/// Human summary of a recovery step, `None` when nothing was done.
pub fn describe_recovery(action: &RecoveryAction) -> Option<String> {
    match action {
        RecoveryAction::NoActionNeeded => None,
        RecoveryAction::DiscardedTemp { temp } => {
            Some(format!("discarded interrupted update {}", temp.display()))
        }
        RecoveryAction::PromotedTemp { temp } => {
            Some(format!("completed interrupted update from {}", temp.display()))
        }
        RecoveryAction::RestoredBackup { backup } => {
            Some(format!("restored from backup {}", backup.display()))
        }
    }
}

fn render_update_text(payload: &UpdateOutput, w: &mut dyn Write) -> io::Result<()> {
    if let Some(recovered) = &payload.recovered {
        writeln!(w, "RECOVERED\t{recovered}")?;
    }
    for change in &payload.applied {
        writeln!(w, "SET\t{}\t{}={}", payload.id, change.field, change.value)?;
    }
    writeln!(
        w,
        "UPDATED\t{}\tline={}\tchanged={}",
        payload.id, payload.line, payload.changed
    )
}

fn render_update_pretty(payload: &UpdateOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Updated {}", payload.id))?;
    pretty_kv(w, "file", &payload.path)?;
    pretty_kv(w, "line", payload.line.to_string())?;
    for change in &payload.applied {
        pretty_kv(w, change.field, &change.value)?;
    }
    if !payload.changed {
        writeln!(w, "Record already had these values.")?;
    }
    pretty_kv(w, "backup", &payload.backup)?;
    if let Some(recovered) = &payload.recovered {
        pretty_kv(w, "recovered", recovered)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use flowcheck_core::model::{Stage, StageState};

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: UpdateArgs,
    }

    #[test]
    fn repeated_set_flags_parse_in_order() {
        let parsed = Wrapper::parse_from([
            "test",
            "--issues",
            "a.jsonl",
            "--id",
            "A",
            "--set",
            "dev_state=done",
            "--set",
            "owner=agent-1",
        ]);
        assert_eq!(
            parsed.args.updates,
            vec![
                FieldUpdate::Stage(Stage::Dev, StageState::Done),
                FieldUpdate::Owner("agent-1".to_string()),
            ]
        );
    }

    #[test]
    fn immutable_field_is_rejected_at_parse_time() {
        let result = Wrapper::try_parse_from(["test", "--issues", "a.jsonl", "--id", "A", "--set", "id=B"]);
        assert!(result.is_err());
    }

    #[test]
    fn set_is_required() {
        assert!(Wrapper::try_parse_from(["test", "--issues", "a.jsonl", "--id", "A"]).is_err());
    }

    #[test]
    fn recovery_summary() {
        assert_eq!(describe_recovery(&RecoveryAction::NoActionNeeded), None);
        let restored = RecoveryAction::RestoredBackup {
            backup: PathBuf::from("a.jsonl.bak"),
        };
        assert_eq!(
            describe_recovery(&restored).as_deref(),
            Some("restored from backup a.jsonl.bak")
        );
    }
}
