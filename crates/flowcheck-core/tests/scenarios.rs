//! End-to-end checks of small issue sets through the full pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use flowcheck_core::check::{CheckOptions, check_issues};
use flowcheck_core::config::PathsConfig;
use flowcheck_core::context::BranchProbe;
use flowcheck_core::report::{Category, ExitStatus, FailOn, Report, Severity, Summary};
use serde_json::{Value, json};
use tempfile::TempDir;

const PLAN_PATH: &str = "docs/plans/2026-03-01-export.md";

struct OnMain;

impl BranchProbe for OnMain {
    fn current_branch(&self, _root: &Path) -> Option<String> {
        Some("main".to_string())
    }
}

struct Project {
    dir: TempDir,
    paths: PathsConfig,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        fs::create_dir_all(dir.path().join("docs/plans")).expect("create plans dir");
        fs::create_dir_all(dir.path().join("docs/issues")).expect("create issues dir");
        fs::write(dir.path().join(PLAN_PATH), "**Goal:** export\n").expect("write plan");
        Self {
            dir,
            paths: PathsConfig::default(),
        }
    }

    fn issues(&self, lines: &[Value]) -> PathBuf {
        let path = self.dir.path().join("docs/issues/2026-03-01-export.jsonl");
        let body: String = lines.iter().map(|line| format!("{line}\n")).collect();
        fs::write(&path, body).expect("write issues");
        path
    }

    fn check(&self, path: &Path) -> Report {
        let opts = CheckOptions {
            project_root: self.dir.path(),
            paths: &self.paths,
            supported_versions: &[2],
            baseline: None,
            probe: &OnMain,
        };
        check_issues(path, &opts).expect("check runs")
    }
}

fn meta(total: u64) -> Value {
    json!({
        "type": "meta",
        "plan": "export",
        "goal": "CSV export",
        "tech_stack": "rust",
        "source": PLAN_PATH,
        "total_issues": total,
        "schema_version": 2,
        "execution_context": {
            "worktree_path": "/work/export",
            "branch": "feat/export",
            "base_branch": "main"
        }
    })
}

fn issue(id: &str, depends_on: &[&str]) -> Value {
    json!({
        "id": id,
        "priority": "P1",
        "phase": 1,
        "area": "export",
        "title": format!("Task {id}"),
        "description": "",
        "depends_on": depends_on,
        "acceptance_criteria": "works",
        "test_approach": "unit",
        "review_initial_requirements": "",
        "review_regression_requirements": "",
        "dev_state": "pending",
        "review_initial_state": "pending",
        "review_regression_state": "pending",
        "git_state": "uncommitted",
        "blocked": false,
        "owner": "",
        "refs": [format!("{PLAN_PATH}:1")],
        "notes": ""
    })
}

#[test]
fn linear_chain_orders_dependencies_first() {
    let project = Project::new();
    let path = project.issues(&[
        meta(3),
        issue("A", &[]),
        issue("B", &["A"]),
        issue("C", &["B"]),
    ]);
    let report = project.check(&path);

    assert_eq!(report.errors(), 0, "{:#?}", report.findings);
    assert_eq!(report.order, Some(vec!["A".into(), "B".into(), "C".into()]));
    assert_eq!(
        ExitStatus::decide(Summary::of(&[report]), FailOn::Error),
        ExitStatus::Pass
    );
}

#[test]
fn mutual_dependency_is_one_cycle_and_no_order() {
    let project = Project::new();
    let path = project.issues(&[meta(2), issue("A", &["B"]), issue("B", &["A"])]);
    let report = project.check(&path);

    let cycles: Vec<_> = report.in_category(Category::Cycle).collect();
    assert_eq!(cycles.len(), 1);
    assert!(
        cycles[0].message.ends_with("(A -> B -> A)") || cycles[0].message.ends_with("(B -> A -> B)"),
        "{}",
        cycles[0].message
    );
    assert!(report.order.is_none());
    assert_eq!(
        ExitStatus::decide(Summary::of(&[report]), FailOn::Error).code(),
        1
    );
}

#[test]
fn committed_and_blocked_is_one_coherence_error() {
    let project = Project::new();
    let mut stuck = issue("A", &[]);
    for stage in ["dev_state", "review_initial_state", "review_regression_state"] {
        stuck[stage] = json!("done");
    }
    stuck["git_state"] = json!("committed");
    stuck["blocked"] = json!(true);
    let path = project.issues(&[meta(1), stuck]);
    let report = project.check(&path);

    let coherence: Vec<_> = report.in_category(Category::Coherence).collect();
    assert_eq!(coherence.len(), 1, "{coherence:#?}");
    assert_eq!(coherence[0].record.as_deref(), Some("A"));
    assert_eq!(coherence[0].severity, Severity::Error);
    assert_eq!(report.converged, Some(false));
}

#[test]
fn total_issues_mismatch_is_reported_once_at_meta() {
    let project = Project::new();
    let path = project.issues(&[meta(3), issue("A", &[]), issue("B", &[])]);
    let report = project.check(&path);

    let errors: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1, "{errors:#?}");
    assert_eq!(errors[0].category, Category::Schema);
    assert!(errors[0].location.ends_with(":1"), "{}", errors[0].location);
    assert_eq!(errors[0].field.as_deref(), Some("total_issues"));
}

#[test]
fn authored_context_is_used_verbatim() {
    let project = Project::new();
    let path = project.issues(&[meta(1), issue("A", &[])]);
    let report = project.check(&path);

    let ctx = report.execution_context.as_ref().expect("context resolved");
    assert_eq!(ctx.worktree_path, "/work/export");
    assert_eq!(ctx.branch, "feat/export");
    assert_eq!(report.count(Severity::Info), 0, "{:#?}", report.findings);
}

#[test]
fn missing_base_branch_falls_back_to_branch() {
    let project = Project::new();
    let mut header = meta(1);
    header["execution_context"] = json!({"worktree_path": "/work/export", "branch": ""});
    let path = project.issues(&[header, issue("A", &[])]);
    let report = project.check(&path);

    assert_eq!(report.errors(), 0);
    let ctx = report.execution_context.clone().expect("context resolved");
    assert_eq!(ctx.branch, "main");
    assert_eq!(ctx.base_branch, "main");
    assert_eq!(report.count(Severity::Info), 2, "{:#?}", report.findings);
}

#[test]
fn malformed_line_does_not_stop_the_batch() {
    let project = Project::new();
    let path = project.dir.path().join("docs/issues/broken.jsonl");
    let mut body = format!("{}\n", meta(3));
    body.push_str(&format!("{}\n", issue("A", &[])));
    body.push_str("{\"id\": \"B\", \n");
    let mut bad_enum = issue("C", &["A"]);
    bad_enum["dev_state"] = json!("finished");
    body.push_str(&format!("{bad_enum}\n"));
    fs::write(&path, body).expect("write issues");

    let report = project.check(&path);
    assert!(report.findings.iter().any(|f| f.location.ends_with(":3")));
    assert!(report.in_category(Category::Enum).any(|f| f.record.as_deref() == Some("C")));
    assert_eq!(report.converged, Some(false));
}
