//! Plan (markdown) schema validation.
//!
//! A plan is free-form markdown with a few fixed anchors:
//!
//! ```text
//! **Goal:** ...
//! **Architecture:** ...
//! **Tech Stack:** ...
//! **Execution Context:** ...
//!
//! ### Task 1: Title
//! **Priority:** P0
//! **Area:** backend
//! **Depends On:** None
//! **Acceptance Criteria:** ...
//! **Review (Dev):** ...
//! **Review (Regression):** ...
//! **Files:**
//! - `src/lib.rs`
//! ```
//!
//! Only the anchors are read; everything else in a section is left alone.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Plan, PlanHeader, PlanTask, Priority};
use crate::report::{Category, Finding};

static TASK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^###\s+Task\s+([0-9]+(?:\.[0-9]+)?):\s+(.+)$").expect("task header pattern is valid")
});

static TASK_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Task\s+([0-9]+(?:\.[0-9]+)?)").expect("task reference pattern is valid")
});

/// `**Label:** value`
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\*\*([^*]+?):\*\*\s*(.*?)\s*$").expect("field pattern is valid")
});

const HEADER_FIELDS: [&str; 4] = ["Goal", "Architecture", "Tech Stack", "Execution Context"];

const TASK_FIELDS: [&str; 6] = [
    "Priority",
    "Area",
    "Depends On",
    "Acceptance Criteria",
    "Review (Dev)",
    "Review (Regression)",
];

/// Result of the plan schema pass.
#[derive(Debug, Clone, Default)]
pub struct ParsedPlan {
    pub plan: Plan,
    pub findings: Vec<Finding>,
}

/// Labels compare case-insensitively with runs of whitespace collapsed.
fn same_label(a: &str, b: &str) -> bool {
    a.split_whitespace()
        .map(str::to_ascii_lowercase)
        .eq(b.split_whitespace().map(str::to_ascii_lowercase))
}

/// Value of the first `**label:**` line in `lines`, if non-empty.
fn extract_field(lines: &[&str], label: &str) -> Option<String> {
    lines.iter().find_map(|line| {
        let caps = FIELD_RE.captures(line)?;
        let found = caps.get(1)?.as_str();
        let value = caps.get(2)?.as_str();
        (same_label(found, label) && !value.is_empty()).then(|| value.to_string())
    })
}

fn has_label(lines: &[&str], label: &str) -> bool {
    lines.iter().any(|line| {
        FIELD_RE
            .captures(line)
            .and_then(|caps| caps.get(1))
            .is_some_and(|found| same_label(found.as_str(), label))
    })
}

/// Task numbers named by a `Depends On` value. `None` means no dependencies.
#[must_use]
pub fn parse_depends(raw: &str) -> Vec<String> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    TASK_REF_RE
        .captures_iter(value)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Parse and validate a plan document.
#[must_use]
pub fn parse_plan(content: &str, label: &str) -> ParsedPlan {
    let mut parsed = ParsedPlan::default();
    let lines: Vec<&str> = content.lines().collect();

    let header_values: Vec<Option<String>> = HEADER_FIELDS
        .iter()
        .map(|name| extract_field(&lines, name))
        .collect();
    for (name, value) in HEADER_FIELDS.iter().zip(&header_values) {
        if value.is_none() {
            parsed.findings.push(
                Finding::error(Category::Schema, label, format!("missing required header '{name}'"))
                    .field(*name),
            );
        }
    }
    if let [goal, architecture, tech_stack, execution_context] = header_values.as_slice() {
        parsed.plan.header = PlanHeader {
            goal: goal.clone(),
            architecture: architecture.clone(),
            tech_stack: tech_stack.clone(),
            execution_context: execution_context.clone(),
        };
    }

    let starts: Vec<(usize, String, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let caps = TASK_HEADER_RE.captures(line.trim())?;
            Some((idx, caps[1].to_string(), caps[2].trim().to_string()))
        })
        .collect();

    if starts.is_empty() {
        parsed.findings.push(Finding::error(
            Category::Schema,
            label,
            "no task section found (expected '### Task N: title')",
        ));
        return parsed;
    }

    for (i, (start, number, title)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(lines.len(), |next| next.0);
        let block = &lines[*start..end];
        let location = format!("{label}:{}", start + 1);
        parsed
            .plan
            .tasks
            .push(parse_task(block, number, title, start + 1, &location, &mut parsed.findings));
    }

    check_task_references(&parsed.plan.tasks, label, &mut parsed.findings);
    parsed
}

fn parse_task(
    block: &[&str],
    number: &str,
    title: &str,
    line: usize,
    location: &str,
    out: &mut Vec<Finding>,
) -> PlanTask {
    let record = format!("Task {number}");
    let missing = |field: &str| {
        Finding::error(
            Category::Schema,
            location,
            format!("Task {number} ({title}) missing field '{field}'"),
        )
        .record(record.clone())
        .field(field)
    };

    for field in TASK_FIELDS {
        if extract_field(block, field).is_none() {
            out.push(missing(field));
        }
    }

    let priority = extract_field(block, "Priority").and_then(|raw| match raw.parse::<Priority>() {
        Ok(priority) => Some(priority),
        Err(_) => {
            out.push(
                Finding::error(
                    Category::Enum,
                    location,
                    format!(
                        "Task {number} invalid Priority '{raw}' (expected one of: {})",
                        Priority::VALUES.join(", ")
                    ),
                )
                .record(record.clone())
                .field("Priority"),
            );
            None
        }
    });

    let depends_raw = extract_field(block, "Depends On").unwrap_or_default();
    let depends_on = parse_depends(&depends_raw);
    if !depends_raw.is_empty() && !depends_raw.eq_ignore_ascii_case("none") && depends_on.is_empty() {
        out.push(
            Finding::error(
                Category::Schema,
                location,
                format!("Task {number} has invalid Depends On '{depends_raw}'"),
            )
            .record(record.clone())
            .field("Depends On"),
        );
    }

    let has_files = has_label(block, "Files");
    if !has_files {
        out.push(
            Finding::error(
                Category::Schema,
                location,
                format!("Task {number} missing '**Files:**' section"),
            )
            .record(record.clone())
            .field("Files"),
        );
    }

    PlanTask {
        number: number.to_string(),
        title: title.to_string(),
        line,
        priority,
        area: extract_field(block, "Area"),
        depends_on,
        acceptance_criteria: extract_field(block, "Acceptance Criteria"),
        review_dev: extract_field(block, "Review (Dev)"),
        review_regression: extract_field(block, "Review (Regression)"),
        has_files,
    }
}

fn check_task_references(tasks: &[PlanTask], label: &str, out: &mut Vec<Finding>) {
    let known: HashSet<&str> = tasks.iter().map(|task| task.number.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    for task in tasks {
        let location = format!("{label}:{}", task.line);
        let record = format!("Task {}", task.number);
        if !seen.insert(task.number.as_str()) {
            out.push(
                Finding::error(
                    Category::Reference,
                    location.clone(),
                    format!("duplicate task number {}", task.number),
                )
                .record(record.clone()),
            );
        }
        for dep in &task.depends_on {
            let message = if *dep == task.number {
                format!("Task {} cannot depend on itself", task.number)
            } else if !known.contains(dep.as_str()) {
                format!("Task {} depends on unknown Task {dep}", task.number)
            } else {
                continue;
            };
            out.push(
                Finding::error(Category::Reference, location.clone(), message)
                    .record(record.clone())
                    .field("Depends On"),
            );
        }
    }
}
