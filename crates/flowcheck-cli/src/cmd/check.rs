//! `flowcheck check`: validate a plan, an issue set, or both.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use flowcheck_core::check::{self, CheckOptions, CheckRequest, Mode};
use flowcheck_core::config::{self, CONFIG_ENV, LoadedConfig};
use flowcheck_core::context::GitBranchProbe;
use flowcheck_core::report::{ExitStatus, FailOn, Report, Summary};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `flowcheck check`.
#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Which artifacts to check: plan, issues, or full.
    #[arg(long, default_value = "full")]
    pub mode: Mode,

    /// Project root; relative artifact paths resolve under it.
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Plan to check instead of the latest one under the plans directory.
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Issue set to check instead of the latest one under the issues directory.
    #[arg(long)]
    pub issues: Option<PathBuf>,

    /// Earlier snapshot of the issue set; stage regressions against it are errors.
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Failure threshold: error, warning, or never. Overrides the config file.
    #[arg(long)]
    pub fail_on: Option<FailOn>,

    /// Alias of `--fail-on warning`.
    #[arg(long, hide = true)]
    pub strict_warnings: bool,

    /// In full mode, treat a missing plan as an error.
    #[arg(long)]
    pub require_plan: bool,

    /// In full mode, treat a missing issue set as an error.
    #[arg(long)]
    pub require_issues: bool,
}

impl CheckArgs {
    fn threshold(&self, configured: FailOn) -> FailOn {
        match (self.fail_on, self.strict_warnings) {
            (Some(fail_on), _) => fail_on,
            (None, true) => FailOn::Warning,
            (None, false) => configured,
        }
    }
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    mode: String,
    fail_on: FailOn,
    status: ExitStatus,
    summary: Summary,
    reports: Vec<Report>,
}

/// Execute `flowcheck check`.
///
/// # Errors
///
/// Returns an error if the project root does not exist, the config cannot be
/// loaded, or an artifact exists but cannot be read.
pub fn run_check(args: &CheckArgs, output: OutputMode) -> anyhow::Result<ExitStatus> {
    let project_root = args
        .project_root
        .canonicalize()
        .with_context(|| format!("Failed to resolve project root {}", args.project_root.display()))?;
    let root = project_root.as_path();
    let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let LoadedConfig { config, source } =
        config::load_config(root, explicit.as_deref()).context("Failed to load flowcheck config")?;
    if let Some(source) = &source {
        tracing::debug!(config = %source.display(), "using config file");
    }

    let probe = GitBranchProbe;
    let opts = CheckOptions {
        project_root: root,
        paths: &config.paths,
        supported_versions: &config.schema.supported_versions,
        baseline: args.baseline.as_deref(),
        probe: &probe,
    };
    let request = CheckRequest {
        mode: args.mode,
        plan: args.plan.as_deref(),
        issues: args.issues.as_deref(),
        require_plan: args.require_plan,
        require_issues: args.require_issues,
    };

    let reports = check::run(&request, &opts)?;
    let summary = Summary::of(&reports);
    let fail_on = args.threshold(config.check.fail_on);
    let status = ExitStatus::decide(summary, fail_on);
    tracing::info!(
        mode = %args.mode,
        errors = summary.errors,
        warnings = summary.warnings,
        exit = status.code(),
        "check finished"
    );

    let payload = CheckOutput {
        mode: args.mode.to_string(),
        fail_on,
        status,
        summary,
        reports,
    };
    render_mode(output, &payload, render_check_text, render_check_pretty)?;
    Ok(status)
}

fn render_check_text(payload: &CheckOutput, w: &mut dyn Write) -> io::Result<()> {
    for report in &payload.reports {
        for finding in &report.findings {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                finding.severity,
                report.name,
                finding.location,
                finding.message
            )?;
        }
        if let Some(order) = &report.order {
            writeln!(w, "ORDER\t{}\t{}", report.name, order.join(","))?;
        }
        if let Some(converged) = report.converged {
            writeln!(w, "CONVERGED\t{}\t{converged}", report.name)?;
        }
    }
    writeln!(
        w,
        "SUMMARY\terrors={}\twarnings={}\tinfos={}\texit={}",
        payload.summary.errors,
        payload.summary.warnings,
        payload.summary.infos,
        payload.status.code()
    )
}

fn render_check_pretty(payload: &CheckOutput, w: &mut dyn Write) -> io::Result<()> {
    for report in &payload.reports {
        pretty_section(w, &format!("flowcheck {}", report.name))?;
        if let Some(artifact) = &report.artifact {
            pretty_kv(w, "artifact", artifact)?;
        }
        if let Some(ctx) = &report.execution_context {
            pretty_kv(w, "worktree", &ctx.worktree_path)?;
            pretty_kv(w, "branch", format!("{} (base {})", ctx.branch, ctx.base_branch))?;
        }
        if let Some(progress) = &report.progress {
            pretty_kv(
                w,
                "progress",
                format!(
                    "{}/{} complete, {} blocked, {} in progress, {} pending",
                    progress.complete,
                    progress.total,
                    progress.blocked,
                    progress.in_progress,
                    progress.pending
                ),
            )?;
        }
        if let Some(order) = &report.order {
            pretty_kv(w, "order", order.join(" -> "))?;
        }
        if let Some(converged) = report.converged {
            pretty_kv(w, "converged", if converged { "yes" } else { "no" })?;
        }
        if report.findings.is_empty() {
            writeln!(w, "No findings.")?;
        }
        for finding in &report.findings {
            writeln!(w, "  {finding}")?;
        }
        writeln!(w)?;
    }
    writeln!(
        w,
        "{} error(s), {} warning(s), {} info; fail-on {} -> exit {}",
        payload.summary.errors,
        payload.summary.warnings,
        payload.summary.infos,
        fail_on_label(payload.fail_on),
        payload.status.code()
    )
}

const fn fail_on_label(fail_on: FailOn) -> &'static str {
    match fail_on {
        FailOn::Error => "error",
        FailOn::Warning => "warning",
        FailOn::Never => "never",
    }
}
