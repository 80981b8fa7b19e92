//! E2E tests for `flowcheck check` and `flowcheck order`.
//!
//! Each test runs the binary as a subprocess against a project laid out in an
//! isolated temp directory, and asserts on exit codes and JSON output.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

const PLAN: &str = "docs/plans/2026-04-01-auth.md";
const ISSUES: &str = "docs/issues/2026-04-01-auth.jsonl";

/// Build a Command targeting the flowcheck binary, rooted in `dir`.
fn fc_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("flowcheck"));
    cmd.current_dir(dir);
    // Keep the user's own config out of the run.
    cmd.env("XDG_CONFIG_HOME", dir.join(".xdg"));
    cmd.env("HOME", dir);
    cmd.env_remove("FLOWCHECK_CONFIG");
    cmd.env_remove("FORMAT");
    // Suppress tracing output that goes to stderr
    cmd.env("FLOWCHECK_LOG", "error");
    cmd
}

fn plan_text(tasks: &[(&str, &str)]) -> String {
    let mut text = String::from(
        "# Auth\n\n**Goal:** login\n**Architecture:** service\n**Tech Stack:** rust\n**Execution Context:** worktree\n",
    );
    for (number, depends) in tasks {
        text.push_str(&format!(
            "\n### Task {number}: Step {number}\n**Priority:** P1\n**Area:** auth\n**Depends On:** {depends}\n\
             **Acceptance Criteria:** works\n**Review (Dev):** tests\n**Review (Regression):** suite\n**Files:**\n- src/lib.rs\n"
        ));
    }
    text
}

fn meta(total: usize) -> Value {
    json!({
        "type": "meta", "plan": "auth", "goal": "login", "tech_stack": "rust",
        "source": PLAN, "total_issues": total, "schema_version": 2,
        "execution_context": {"worktree_path": "/wt/auth", "branch": "feat/auth", "base_branch": "main"}
    })
}

fn issue(id: &str, depends_on: &[&str]) -> Value {
    json!({
        "id": id, "priority": "P1", "phase": 1, "area": "auth", "title": format!("Issue {id}"),
        "description": "", "depends_on": depends_on, "acceptance_criteria": "works",
        "test_approach": "unit", "review_initial_requirements": "", "review_regression_requirements": "",
        "dev_state": "pending", "review_initial_state": "pending", "review_regression_state": "pending",
        "git_state": "uncommitted", "blocked": false, "owner": "", "refs": [format!("{PLAN}:1")], "notes": ""
    })
}

fn complete(id: &str) -> Value {
    let mut value = issue(id, &[]);
    for stage in ["dev_state", "review_initial_state", "review_regression_state"] {
        value[stage] = json!("done");
    }
    value["git_state"] = json!("committed");
    value
}

/// Lay out a project with one plan and one issue set.
fn project(lines: &[Value]) -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    fs::create_dir_all(dir.path().join("docs/plans")).expect("plans dir");
    fs::create_dir_all(dir.path().join("docs/issues")).expect("issues dir");
    fs::write(dir.path().join(PLAN), plan_text(&[("1", "None"), ("2", "Task 1")])).expect("plan");
    let body: String = lines.iter().map(|line| format!("{line}\n")).collect();
    fs::write(dir.path().join(ISSUES), body).expect("issues");
    dir
}

fn check_json(dir: &Path, extra: &[&str]) -> (i32, Value) {
    let output = fc_cmd(dir)
        .args(["check", "--project-root", ".", "--format", "json"])
        .args(extra)
        .output()
        .expect("check should not crash");
    let json: Value = serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "check --format json should produce valid JSON: {e}\nstderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output.status.code().expect("exit code"), json)
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn clean_project_passes_and_converges() {
    let dir = project(&[meta(2), complete("A"), complete("B")]);
    let (code, json) = check_json(dir.path(), &[]);

    assert_eq!(code, 0, "{json:#}");
    assert_eq!(json["summary"]["errors"], 0);
    let reports = json["reports"].as_array().expect("reports array");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["name"], "plan");
    assert_eq!(reports[0]["order"], json!(["1", "2"]));
    assert_eq!(reports[1]["converged"], true);
    assert_eq!(reports[1]["execution_context"]["branch"], "feat/auth");
}

#[test]
fn cycle_exits_one_with_cycle_finding() {
    let dir = project(&[meta(2), issue("A", &["B"]), issue("B", &["A"])]);
    let (code, json) = check_json(dir.path(), &["--mode", "issues"]);

    assert_eq!(code, 1);
    let findings = json["reports"][0]["findings"].as_array().expect("findings");
    let cycles: Vec<&Value> = findings.iter().filter(|f| f["category"] == "cycle").collect();
    assert_eq!(cycles.len(), 1);
    assert!(
        cycles[0]["message"]
            .as_str()
            .is_some_and(|m| m.contains("A -> B -> A")),
        "{:#}",
        cycles[0]
    );
    assert!(json["reports"][0].get("order").is_none());
}

#[test]
fn warnings_respect_fail_on() {
    let dir = project(&[meta(1), issue("A", &[])]);
    // A newer plan makes the issue set stale: a warning, not an error.
    fs::write(
        dir.path().join("docs/plans/2026-05-01-auth-v2.md"),
        plan_text(&[("1", "None")]),
    )
    .expect("newer plan");

    let (code, json) = check_json(dir.path(), &["--mode", "issues"]);
    assert_eq!(code, 0);
    assert_eq!(json["summary"]["warnings"], 1);

    let (code, _) = check_json(dir.path(), &["--mode", "issues", "--fail-on", "warning"]);
    assert_eq!(code, 2);

    let (code, _) = check_json(dir.path(), &["--mode", "issues", "--strict-warnings"]);
    assert_eq!(code, 2);
}

#[test]
fn fail_on_never_passes_with_errors() {
    let dir = project(&[meta(3), issue("A", &[])]);
    let (code, json) = check_json(dir.path(), &["--mode", "issues", "--fail-on", "never"]);
    assert_eq!(code, 0);
    assert!(json["summary"]["errors"].as_u64().is_some_and(|n| n > 0));
}

#[test]
fn config_file_sets_threshold() {
    let dir = project(&[meta(1), issue("A", &[])]);
    fs::write(
        dir.path().join("docs/plans/2026-05-01-auth-v2.md"),
        plan_text(&[("1", "None")]),
    )
    .expect("newer plan");
    fs::create_dir_all(dir.path().join(".flowcheck")).expect("config dir");
    fs::write(
        dir.path().join(".flowcheck/config.toml"),
        "[check]\nfail_on = \"warning\"\n",
    )
    .expect("config");

    let (code, json) = check_json(dir.path(), &["--mode", "issues"]);
    assert_eq!(code, 2);
    assert_eq!(json["fail_on"], "warning");
}

#[test]
fn broken_config_is_a_runtime_failure() {
    let dir = project(&[meta(1), issue("A", &[])]);
    fs::create_dir_all(dir.path().join(".flowcheck")).expect("config dir");
    fs::write(dir.path().join(".flowcheck/config.toml"), "[check\n").expect("config");

    fc_cmd(dir.path())
        .args(["check", "--format", "text"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("E1002"));
}

#[test]
fn full_mode_skips_missing_artifacts_unless_required() {
    let dir = TempDir::new().expect("create temp dir");

    let (code, json) = check_json(dir.path(), &[]);
    assert_eq!(code, 0, "{json:#}");
    assert_eq!(json["summary"]["infos"], 2);

    let (code, _) = check_json(dir.path(), &["--require-issues"]);
    assert_eq!(code, 1);

    let (code, _) = check_json(dir.path(), &["--mode", "plan"]);
    assert_eq!(code, 1);
}

#[test]
fn baseline_regression_is_an_error() {
    let mut reworked = complete("A");
    reworked["review_regression_state"] = json!("in_progress");
    reworked["git_state"] = json!("uncommitted");
    let dir = project(&[meta(1), reworked]);
    let baseline = dir.path().join("baseline.jsonl");
    fs::write(&baseline, format!("{}\n{}\n", meta(1), complete("A"))).expect("baseline");

    let (code, json) = check_json(
        dir.path(),
        &["--mode", "issues", "--baseline", baseline.to_str().expect("utf8 path")],
    );
    assert_eq!(code, 1);
    let coherence = json["reports"][0]["findings"]
        .as_array()
        .expect("findings")
        .iter()
        .filter(|f| f["category"] == "coherence")
        .count();
    assert_eq!(coherence, 1, "{json:#}");
}

#[test]
fn fallback_worktree_is_the_resolved_project_root() {
    let mut header = meta(1);
    header.as_object_mut().expect("meta object").remove("execution_context");
    let dir = project(&[header, issue("A", &[])]);
    let (_, json) = check_json(dir.path(), &["--mode", "issues"]);

    let root = dir.path().canonicalize().expect("canonical root");
    let worktree = &json["reports"][0]["execution_context"]["worktree_path"];
    assert_eq!(worktree.as_str(), root.to_str());
    assert_ne!(worktree, ".");
}

#[test]
fn missing_project_root_is_a_runtime_failure() {
    let dir = TempDir::new().expect("create temp dir");
    fc_cmd(dir.path())
        .args(["check", "--project-root", "no-such-dir", "--format", "text"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to resolve project root"));
}

#[test]
fn text_output_ends_with_summary() {
    let dir = project(&[meta(1), issue("A", &[])]);
    fc_cmd(dir.path())
        .args(["check", "--mode", "issues", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ORDER\tissues\tA"))
        .stdout(predicate::str::ends_with("exit=0\n"));
}

#[test]
fn format_env_selects_json() {
    let dir = project(&[meta(1), issue("A", &[])]);
    let output = fc_cmd(dir.path())
        .env("FORMAT", "json")
        .args(["check", "--mode", "issues"])
        .output()
        .expect("check should not crash");
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["mode"], "issues");
}

// ---------------------------------------------------------------------------
// order
// ---------------------------------------------------------------------------

#[test]
fn order_prints_dependencies_first() {
    let dir = project(&[meta(3), issue("C", &["B"]), issue("B", &["A"]), issue("A", &[])]);
    fc_cmd(dir.path())
        .args(["order", "--issues", ISSUES, "--format", "text"])
        .assert()
        .success()
        .stdout("A\nB\nC\n");
}

#[test]
fn order_reports_cycle_with_exit_one() {
    let dir = project(&[meta(2), issue("A", &["B"]), issue("B", &["A"])]);
    let output = fc_cmd(dir.path())
        .args(["order", "--issues", ISSUES, "--json"])
        .output()
        .expect("order should not crash");
    assert_eq!(output.status.code(), Some(1));
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["cycle"], json!(["A", "B", "A"]));
    assert_eq!(json["error_code"], "E2003");
}

#[test]
fn order_of_schema_broken_set_exits_one() {
    // total_issues disagrees with the single record.
    let dir = project(&[meta(2), issue("A", &[])]);
    let output = fc_cmd(dir.path())
        .args(["order", "--issues", ISSUES, "--json"])
        .output()
        .expect("order should not crash");
    assert_eq!(output.status.code(), Some(1));
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["order"], json!(["A"]));
    assert_eq!(json["schema_errors"], 1);
}

#[test]
fn order_honors_configured_schema_versions() {
    let mut header = meta(1);
    header["schema_version"] = json!(3);
    let dir = project(&[header, issue("A", &[])]);

    let output = fc_cmd(dir.path())
        .args(["order", "--issues", ISSUES, "--json"])
        .output()
        .expect("order should not crash");
    assert_eq!(output.status.code(), Some(1));

    fs::create_dir_all(dir.path().join(".flowcheck")).expect("config dir");
    fs::write(
        dir.path().join(".flowcheck/config.toml"),
        "[schema]\nsupported_versions = [2, 3]\n",
    )
    .expect("config");
    let output = fc_cmd(dir.path())
        .args(["order", "--issues", ISSUES, "--json"])
        .output()
        .expect("order should not crash");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stdout));
}

#[test]
fn order_plan_by_task_number() {
    let dir = project(&[meta(1), issue("A", &[])]);
    let output = fc_cmd(dir.path())
        .args(["order", "--plan", PLAN, "--json"])
        .output()
        .expect("order should not crash");
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["order"], json!(["1", "2"]));
}

#[test]
fn missing_artifact_for_order_is_runtime_failure() {
    let dir = TempDir::new().expect("create temp dir");
    fc_cmd(dir.path())
        .args(["order", "--issues", "nope.jsonl"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn bad_arguments_exit_three() {
    let dir = TempDir::new().expect("create temp dir");
    fc_cmd(dir.path())
        .args(["check", "--mode", "skills"])
        .assert()
        .code(3);
}
