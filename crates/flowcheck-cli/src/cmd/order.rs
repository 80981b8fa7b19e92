//! `flowcheck order`: print the canonical execution order, or the cycle that
//! prevents one.
//!
//! The order is computed even when the artifact has schema errors, since the
//! graph is built from every line with a usable id. Such errors are counted in
//! the output and turn the exit status into a validation error.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use flowcheck_core::config::{self, CONFIG_ENV};
use flowcheck_core::error::ErrorCode;
use flowcheck_core::graph::{DepGraph, Node, topological_order};
use flowcheck_core::report::{ExitStatus, Finding, Severity};
use flowcheck_core::resolve::resolve_under;
use flowcheck_core::schema::{self, IssueSchema};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `flowcheck order`.
#[derive(Args, Debug, Default)]
pub struct OrderArgs {
    /// Issue set to order.
    #[arg(long)]
    pub issues: Option<PathBuf>,

    /// Plan to order by task number.
    #[arg(long, conflicts_with = "issues")]
    pub plan: Option<PathBuf>,

    /// Project root; relative paths resolve under it.
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,
}

#[derive(Debug, Serialize)]
struct OrderOutput {
    artifact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycle: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    /// Schema errors found while reading the artifact.
    schema_errors: usize,
}

/// Graph input read from one artifact, with the parse findings.
struct Parsed {
    nodes: Vec<Node>,
    findings: Vec<Finding>,
}

/// Execute `flowcheck order`.
///
/// Exits with the validation-error status when the graph has a cycle or the
/// artifact has schema errors.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or the artifact cannot be
/// read.
pub fn run_order(args: &OrderArgs, output: OutputMode) -> anyhow::Result<ExitStatus> {
    let root = &args.project_root;
    let (path, parsed) = match (&args.issues, &args.plan) {
        (Some(issues), _) => {
            let path = resolve_under(root, issues);
            let parsed = parse_issue_set(&path, root)?;
            (path, parsed)
        }
        (None, Some(plan)) => {
            let path = resolve_under(root, plan);
            let parsed = parse_plan_tasks(&path)?;
            (path, parsed)
        }
        (None, None) => anyhow::bail!("one of --issues or --plan is required"),
    };

    let schema_errors = parsed
        .findings
        .iter()
        .filter(|finding| finding.severity == Severity::Error)
        .count();
    if schema_errors > 0 {
        tracing::warn!(path = %path.display(), errors = schema_errors, "artifact has schema errors");
    }

    let graph = DepGraph::new(parsed.nodes);
    let mut payload = OrderOutput {
        artifact: path.display().to_string(),
        order: None,
        cycle: None,
        error_code: None,
        schema_errors,
    };
    match topological_order(&graph) {
        Ok(order) => payload.order = Some(order),
        Err(cycle) => {
            payload.cycle = Some(cycle.path);
            payload.error_code = Some(ErrorCode::CycleDetected.code());
        }
    }
    let status = if payload.cycle.is_some() || schema_errors > 0 {
        ExitStatus::ValidationError
    } else {
        ExitStatus::Pass
    };

    render_mode(output, &payload, render_order_text, render_order_pretty)?;
    Ok(status)
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_issue_set(path: &Path, root: &Path) -> anyhow::Result<Parsed> {
    let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let loaded = config::load_config(root, explicit.as_deref()).context("Failed to load flowcheck config")?;
    let content = read(path)?;
    let label = path.display().to_string();
    let schema = IssueSchema {
        label: &label,
        project_root: root,
        supported_versions: &loaded.config.schema.supported_versions,
    };
    let parsed = schema::parse_issues(&content, &schema);
    Ok(Parsed {
        nodes: parsed.nodes,
        findings: parsed.findings,
    })
}

fn parse_plan_tasks(path: &Path) -> anyhow::Result<Parsed> {
    let content = read(path)?;
    let parsed = schema::parse_plan(&content, &path.display().to_string());
    Ok(Parsed {
        nodes: parsed.plan.tasks.iter().map(Node::from).collect(),
        findings: parsed.findings,
    })
}

fn render_order_text(payload: &OrderOutput, w: &mut dyn Write) -> io::Result<()> {
    if let Some(order) = &payload.order {
        for id in order {
            writeln!(w, "{id}")?;
        }
    }
    if let Some(cycle) = &payload.cycle {
        let code = payload.error_code.unwrap_or_default();
        writeln!(w, "CYCLE\t{code}\t{}", cycle.join(" -> "))?;
    }
    if payload.schema_errors > 0 {
        writeln!(w, "SCHEMA_ERRORS\t{}", payload.schema_errors)?;
    }
    Ok(())
}

fn render_order_pretty(payload: &OrderOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Execution order")?;
    pretty_kv(w, "artifact", &payload.artifact)?;
    if let Some(order) = &payload.order {
        for (idx, id) in order.iter().enumerate() {
            writeln!(w, "{:>4}. {id}", idx + 1)?;
        }
    }
    if let Some(cycle) = &payload.cycle {
        writeln!(w, "No order: dependency cycle {}", cycle.join(" -> "))?;
        if let Some(hint) = ErrorCode::CycleDetected.hint() {
            pretty_kv(w, "hint", hint)?;
        }
    }
    if payload.schema_errors > 0 {
        pretty_kv(w, "schema", format!("{} error(s); run `flowcheck check` for details", payload.schema_errors))?;
    }
    Ok(())
}
