//! `flowcheck recover`: run the crash-recovery protocol on an issue set.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use flowcheck_core::recovery;
use flowcheck_core::report::ExitStatus;
use flowcheck_core::resolve::resolve_under;
use serde::Serialize;

use crate::cmd::update::describe_recovery;
use crate::output::{OutputMode, render_mode};

/// Arguments for `flowcheck recover`.
#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// Issue set to recover.
    #[arg(long)]
    pub issues: PathBuf,

    /// Project root; a relative `--issues` path resolves under it.
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,
}

#[derive(Debug, Serialize)]
struct RecoverOutput {
    path: String,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
}

/// Execute `flowcheck recover`.
///
/// # Errors
///
/// Returns an error if nothing recoverable exists or the filesystem fails.
pub fn run_recover(args: &RecoverArgs, output: OutputMode) -> anyhow::Result<ExitStatus> {
    let path = resolve_under(&args.project_root, &args.issues);
    let action = recovery::recover(&path)
        .with_context(|| format!("Failed to recover {}", path.display()))?;

    let payload = RecoverOutput {
        path: path.display().to_string(),
        changed: action.changed(),
        action: describe_recovery(&action),
    };
    render_mode(output, &payload, render_recover, render_recover)?;
    Ok(ExitStatus::Pass)
}

fn render_recover(payload: &RecoverOutput, w: &mut dyn Write) -> io::Result<()> {
    match &payload.action {
        Some(action) => writeln!(w, "{}: {action}", payload.path),
        None => writeln!(w, "{}: consistent, nothing to recover", payload.path),
    }
}
