//! One validation run over a plan and/or an issue set.
//!
//! # Overview
//!
//! [`run`] picks the artifacts for a [`Mode`], checks each one, and returns
//! one [`Report`] per artifact. A check is a fixed pipeline:
//!
//! 1. read the file (missing or non-UTF-8 files are findings, not failures)
//! 2. schema pass
//! 3. execution-context resolution (issue sets)
//! 4. dependency graph: cycle or canonical order
//! 5. coherence: record rules, baseline comparison, freshness, progress
//!
//! Only I/O failures that are not about the data itself abort a run; they
//! surface as [`CheckError`] and map to the runtime-failure exit code.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::coherence::{self, Progress};
use crate::config::PathsConfig;
use crate::context::{self, BranchProbe, Fallback};
use crate::error::ErrorCode;
use crate::graph::{DepGraph, topological_order};
use crate::model::{IssueRecord, ParseEnumError};
use crate::report::{Category, Finding, Report};
use crate::resolve::{latest_artifact, resolve_under};
use crate::schema::{self, IssueSchema};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Which artifacts a run covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    Plan,
    Issues,
    #[default]
    Full,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plan => "plan",
            Self::Issues => "issues",
            Self::Full => "full",
        })
    }
}

impl FromStr for Mode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plan" => Ok(Self::Plan),
            "issues" => Ok(Self::Issues),
            "full" => Ok(Self::Full),
            _ => Err(ParseEnumError {
                expected: "check mode",
                got: s.to_string(),
            }),
        }
    }
}

/// Environment shared by every check in a run.
#[derive(Clone, Copy)]
pub struct CheckOptions<'a> {
    pub project_root: &'a Path,
    pub paths: &'a PathsConfig,
    pub supported_versions: &'a [u64],
    /// Earlier snapshot of the issue set, for monotonicity checks.
    pub baseline: Option<&'a Path>,
    pub probe: &'a dyn BranchProbe,
}

impl fmt::Debug for CheckOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOptions")
            .field("project_root", &self.project_root)
            .field("paths", &self.paths)
            .field("supported_versions", &self.supported_versions)
            .field("baseline", &self.baseline)
            .finish_non_exhaustive()
    }
}

impl CheckOptions<'_> {
    fn plans_dir(&self) -> PathBuf {
        resolve_under(self.project_root, &self.paths.plans_dir)
    }

    fn issues_dir(&self) -> PathBuf {
        resolve_under(self.project_root, &self.paths.issues_dir)
    }
}

/// What to check in one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckRequest<'a> {
    pub mode: Mode,
    pub plan: Option<&'a Path>,
    pub issues: Option<&'a Path>,
    /// In `full` mode, fail when no plan can be found.
    pub require_plan: bool,
    /// In `full` mode, fail when no issue set can be found.
    pub require_issues: bool,
}

/// A run that could not complete for reasons unrelated to the data.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list {}: {source}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CheckError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::List { .. } => ErrorCode::ArtifactUnreadable,
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Check every artifact selected by `request`.
///
/// # Errors
///
/// Returns a [`CheckError`] on I/O failures that prevent checking.
pub fn run(request: &CheckRequest<'_>, opts: &CheckOptions<'_>) -> Result<Vec<Report>, CheckError> {
    tracing::debug!(mode = %request.mode, root = %opts.project_root.display(), "check run");
    match request.mode {
        Mode::Plan => Ok(vec![plan_report(request.plan, true, opts)?]),
        Mode::Issues => Ok(vec![issues_report(request.issues, true, opts)?]),
        Mode::Full => Ok(vec![
            plan_report(request.plan, request.require_plan, opts)?,
            issues_report(request.issues, request.require_issues, opts)?,
        ]),
    }
}

/// Check the explicit plan, or the latest one under the plans directory.
///
/// # Errors
///
/// Returns a [`CheckError`] on I/O failures.
pub fn plan_report(
    explicit: Option<&Path>,
    required: bool,
    opts: &CheckOptions<'_>,
) -> Result<Report, CheckError> {
    match locate("plan", explicit, &opts.plans_dir(), "md", required, opts)? {
        Located::Found(path) => check_plan(&path),
        Located::Skipped(report) => Ok(report),
    }
}

/// Check the explicit issue set, or the latest one under the issues directory.
///
/// # Errors
///
/// Returns a [`CheckError`] on I/O failures.
pub fn issues_report(
    explicit: Option<&Path>,
    required: bool,
    opts: &CheckOptions<'_>,
) -> Result<Report, CheckError> {
    match locate("issues", explicit, &opts.issues_dir(), "jsonl", required, opts)? {
        Located::Found(path) => check_issues(&path, opts),
        Located::Skipped(report) => Ok(report),
    }
}

enum Located {
    Found(PathBuf),
    Skipped(Report),
}

fn locate(
    name: &str,
    explicit: Option<&Path>,
    dir: &Path,
    extension: &str,
    required: bool,
    opts: &CheckOptions<'_>,
) -> Result<Located, CheckError> {
    if let Some(path) = explicit {
        return Ok(Located::Found(resolve_under(opts.project_root, path)));
    }
    let latest = latest_artifact(dir, extension).map_err(|source| CheckError::List {
        path: dir.to_path_buf(),
        source,
    })?;
    if let Some(path) = latest {
        tracing::debug!(path = %path.display(), "using latest {name} artifact");
        return Ok(Located::Found(path));
    }

    let mut report = Report::new(name);
    let location = dir.display().to_string();
    if required {
        report.push(Finding::error(
            Category::Schema,
            location,
            format!("no {name} file found under {}", dir.display()),
        ));
    } else {
        report.push(Finding::info(
            location,
            format!("{name} check skipped: no file under {}", dir.display()),
        ));
    }
    Ok(Located::Skipped(report))
}

/// Read an artifact. Missing, non-file, and non-UTF-8 paths become findings.
fn read_artifact(path: &Path, report: &mut Report) -> Result<Option<String>, CheckError> {
    let location = path.display().to_string();
    if !path.exists() {
        report.push(Finding::error(Category::Schema, location, "file not found"));
        return Ok(None);
    }
    if !path.is_file() {
        report.push(Finding::error(Category::Schema, location, "path is not a file"));
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|source| CheckError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    match String::from_utf8(bytes) {
        Ok(content) => Ok(Some(content)),
        Err(_) => {
            report.push(Finding::error(Category::Schema, location, "file is not UTF-8 decodable"));
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Check one plan document.
///
/// # Errors
///
/// Returns a [`CheckError`] if the file exists but cannot be read.
pub fn check_plan(path: &Path) -> Result<Report, CheckError> {
    let mut report = Report::new("plan");
    let label = path.display().to_string();
    report.artifact = Some(label.clone());

    let Some(content) = read_artifact(path, &mut report)? else {
        return Ok(report);
    };

    let parsed = schema::parse_plan(&content, &label);
    report.extend(parsed.findings);
    if parsed.plan.tasks.is_empty() {
        return Ok(report);
    }

    let graph = DepGraph::from_tasks(&parsed.plan.tasks);
    match topological_order(&graph) {
        Ok(order) => report.order = Some(order),
        Err(cycle) => report.push(
            Finding::error(Category::Cycle, label, cycle.to_string())
                .record(cycle.path.first().cloned().unwrap_or_default()),
        ),
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Check one issue set.
///
/// # Errors
///
/// Returns a [`CheckError`] if the file, the baseline, or the plans directory
/// exists but cannot be read.
pub fn check_issues(path: &Path, opts: &CheckOptions<'_>) -> Result<Report, CheckError> {
    let mut report = Report::new("issues");
    let label = path.display().to_string();
    report.artifact = Some(label.clone());

    let Some(content) = read_artifact(path, &mut report)? else {
        return Ok(report);
    };

    let schema = IssueSchema {
        label: &label,
        project_root: opts.project_root,
        supported_versions: opts.supported_versions,
    };
    let parsed = schema::parse_issues(&content, &schema);
    report.extend(parsed.findings.iter().cloned());

    let Some(meta_line) = parsed.meta_line else {
        return Ok(report);
    };
    let meta_loc = format!("{label}:{meta_line}");

    // Context fallbacks are settled before any coherence rule runs.
    let resolved = context::resolve(parsed.execution_context.as_ref(), opts.project_root, opts.probe);
    for fallback in &resolved.fallbacks {
        report.push(Finding::info(meta_loc.clone(), describe_fallback(*fallback, &resolved.context)).field("execution_context"));
    }
    report.execution_context = Some(resolved.context);

    if parsed.nodes.is_empty() && parsed.issue_lines == 0 {
        return Ok(report);
    }

    let graph = DepGraph::new(parsed.nodes.iter().cloned());
    match topological_order(&graph) {
        Ok(order) => report.order = Some(order),
        Err(cycle) => report.push(
            Finding::error(Category::Cycle, label.clone(), cycle.to_string())
                .record(cycle.path.first().cloned().unwrap_or_default()),
        ),
    }

    for located in &parsed.records {
        let loc = format!("{label}:{}", located.line);
        report.extend(coherence::check_record(&located.record, &loc));
        report.extend(coherence::appended_advisory(&located.record, &loc));
    }

    let records: Vec<IssueRecord> = parsed.records.iter().map(|l| l.record.clone()).collect();
    if let Some(baseline) = opts.baseline {
        compare_baseline(baseline, &records, parsed.is_fully_typed(), &schema, &mut report)?;
    }

    let mut stale = false;
    if let Some(meta) = &parsed.meta {
        let linked = resolve_under(opts.project_root, Path::new(meta.source.trim()));
        let plans_dir = opts.plans_dir();
        let latest = latest_artifact(&plans_dir, "md").map_err(|source| CheckError::List {
            path: plans_dir.clone(),
            source,
        })?;
        let staleness = coherence::assess_freshness(&linked, latest.as_deref()).map_err(|source| {
            CheckError::Read {
                path: linked.clone(),
                source,
            }
        })?;
        if let Some(staleness) = staleness {
            stale = true;
            report.push(Finding::warning(Category::Freshness, meta_loc.clone(), staleness.to_string()).field("source"));
        }
    }

    let progress = Progress::of(&records);
    let converged = parsed.is_fully_typed() && coherence::is_converged(&progress, report.errors(), stale);
    report.progress = Some(progress);
    report.converged = Some(converged);
    tracing::debug!(
        path = %label,
        errors = report.errors(),
        warnings = report.warnings(),
        converged,
        "issue set checked"
    );
    Ok(report)
}

fn compare_baseline(
    baseline: &Path,
    current: &[IssueRecord],
    current_typed: bool,
    schema: &IssueSchema<'_>,
    report: &mut Report,
) -> Result<(), CheckError> {
    let location = baseline.display().to_string();
    let content = fs::read_to_string(baseline).map_err(|source| CheckError::Read {
        path: baseline.to_path_buf(),
        source,
    })?;

    let base_schema = IssueSchema {
        label: &location,
        ..*schema
    };
    let Some(before) = schema::parse_issues(&content, &base_schema).into_set() else {
        report.push(Finding::error(
            Category::Schema,
            location,
            "baseline is not a valid issue set; monotonicity was not checked",
        ));
        return Ok(());
    };
    if !current_typed {
        report.push(Finding::info(
            location,
            "baseline comparison skipped: the issue set has schema errors",
        ));
        return Ok(());
    }

    report.extend(coherence::compare_snapshots(&before.records, current, schema.label));
    Ok(())
}

fn describe_fallback(fallback: Fallback, ctx: &context::ExecutionContext) -> String {
    match fallback {
        Fallback::Missing => format!(
            "Meta execution_context missing; using fallback context (worktree_path={}, branch={})",
            ctx.worktree_path, ctx.branch
        ),
        Fallback::NotAnObject => format!(
            "Meta execution_context is not an object; using fallback context (worktree_path={}, branch={})",
            ctx.worktree_path, ctx.branch
        ),
        Fallback::Field(key) => {
            let value = match key {
                "worktree_path" => &ctx.worktree_path,
                "branch" => &ctx.branch,
                _ => &ctx.base_branch,
            };
            format!("Meta execution_context missing '{key}'; using fallback ({value})")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
