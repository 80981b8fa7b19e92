//! Findings, per-artifact reports, and the exit-code policy.
//!
//! Every check appends [`Finding`]s to a [`Report`]; nothing is dropped or
//! deduplicated. [`Summary`] totals the tiers across reports and
//! [`ExitStatus::decide`] turns the totals into a process exit code according
//! to the caller's [`FailOn`] threshold.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::coherence::Progress;
use crate::context::ExecutionContext;
use crate::model::ParseEnumError;

/// Severity tier of a finding. `Info` is advisory and never affects the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// What kind of defect a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Missing or mistyped field, malformed line, unreadable artifact.
    Schema,
    /// Value outside an enum's declared set.
    Enum,
    /// Dangling, duplicate, or self `depends_on` reference.
    Reference,
    /// Dependency cycle; the message carries the cycle path.
    Cycle,
    /// Cross-field or cross-snapshot invariant violation.
    Coherence,
    /// The issue set is stale relative to the plans on disk.
    Freshness,
    /// Informational note (fallbacks used, optional paths missing).
    Advisory,
}

/// One reported problem or advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    /// `path` or `path:line`.
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn new(
        severity: Severity,
        category: Category,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            location: location.into(),
            record: None,
            field: None,
            message: message.into(),
        }
    }

    pub fn error(category: Category, location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, location, message)
    }

    pub fn warning(
        category: Category,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, category, location, message)
    }

    pub fn info(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, Category::Advisory, location, message)
    }

    /// Attach the offending record id.
    #[must_use]
    pub fn record(mut self, id: impl Into<String>) -> Self {
        self.record = Some(id.into());
        self
    }

    /// Attach the offending field name.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.field = Some(name.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if !self.location.is_empty() {
            write!(f, " [{}]", self.location)?;
        }
        Ok(())
    }
}

/// Findings and derived data for one artifact (`plan` or `issues`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub name: String,
    /// Artifact that was checked, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    pub findings: Vec<Finding>,
    /// Canonical execution order; absent when the graph has a cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Whether the issue set can be declared fully converged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<ExecutionContext>,
}

impl Report {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact: None,
            findings: Vec::new(),
            order: None,
            progress: None,
            converged: None,
            execution_context: None,
        }
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == severity)
            .count()
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    #[must_use]
    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Findings in one category.
    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |finding| finding.category == category)
    }
}

/// Totals across every report of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl Summary {
    #[must_use]
    pub fn of(reports: &[Report]) -> Self {
        reports.iter().fold(Self::default(), |acc, report| Self {
            errors: acc.errors + report.errors(),
            warnings: acc.warnings + report.warnings(),
            infos: acc.infos + report.count(Severity::Info),
        })
    }
}

/// Caller-chosen failure threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    #[default]
    Error,
    Warning,
    Never,
}

impl FromStr for FailOn {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "never" => Ok(Self::Never),
            _ => Err(ParseEnumError {
                expected: "fail-on threshold",
                got: s.to_string(),
            }),
        }
    }
}

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Pass,
    ValidationError,
    WarningThreshold,
    RuntimeFailure,
}

impl ExitStatus {
    /// Apply the exit policy to a run's totals.
    #[must_use]
    pub const fn decide(summary: Summary, fail_on: FailOn) -> Self {
        match fail_on {
            FailOn::Never => Self::Pass,
            _ if summary.errors > 0 => Self::ValidationError,
            FailOn::Warning if summary.warnings > 0 => Self::WarningThreshold,
            _ => Self::Pass,
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::ValidationError => 1,
            Self::WarningThreshold => 2,
            Self::RuntimeFailure => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(errors: usize, warnings: usize) -> Summary {
        Summary {
            errors,
            warnings,
            infos: 0,
        }
    }

    #[test]
    fn empty_report_counts_nothing() {
        let report = Report::new("issues");
        assert_eq!(report.errors(), 0);
        assert_eq!(report.warnings(), 0);
    }

    #[test]
    fn info_does_not_count_as_error_or_warning() {
        let mut report = Report::new("issues");
        report.push(Finding::info("a.jsonl:1", "fallback used"));
        report.push(Finding::warning(Category::Freshness, "a.jsonl:1", "stale"));
        report.push(Finding::error(Category::Schema, "a.jsonl:2", "bad"));
        report.push(Finding::error(Category::Cycle, "a.jsonl", "cycle"));
        assert_eq!(report.errors(), 2);
        assert_eq!(report.warnings(), 1);
        assert_eq!(report.count(Severity::Info), 1);
        assert_eq!(report.in_category(Category::Cycle).count(), 1);
    }

    #[test]
    fn summary_adds_reports() {
        let mut plan = Report::new("plan");
        plan.push(Finding::error(Category::Schema, "p.md", "x"));
        let mut issues = Report::new("issues");
        issues.push(Finding::warning(Category::Freshness, "i.jsonl", "y"));
        issues.push(Finding::info("i.jsonl", "z"));
        let totals = Summary::of(&[plan, issues]);
        assert_eq!(totals, Summary { errors: 1, warnings: 1, infos: 1 });
    }

    #[test]
    fn exit_policy_matrix() {
        assert_eq!(ExitStatus::decide(summary(1, 0), FailOn::Error).code(), 1);
        assert_eq!(ExitStatus::decide(summary(0, 3), FailOn::Warning).code(), 2);
        assert_eq!(ExitStatus::decide(summary(1, 3), FailOn::Warning).code(), 1);
        assert_eq!(ExitStatus::decide(summary(5, 2), FailOn::Never).code(), 0);
        assert_eq!(ExitStatus::decide(summary(0, 0), FailOn::Error).code(), 0);
        assert_eq!(ExitStatus::decide(summary(0, 5), FailOn::Error).code(), 0);
        assert_eq!(ExitStatus::RuntimeFailure.code(), 3);
    }

    #[test]
    fn finding_display_includes_location() {
        let finding = Finding::error(Category::Coherence, "i.jsonl:3", "Committed issue cannot be blocked")
            .record("A")
            .field("blocked");
        assert_eq!(
            finding.to_string(),
            "ERROR: Committed issue cannot be blocked [i.jsonl:3]"
        );
        assert_eq!(finding.record.as_deref(), Some("A"));
    }

    #[test]
    fn fail_on_parses_aliases() {
        assert_eq!("warn".parse::<FailOn>().unwrap(), FailOn::Warning);
        assert_eq!("NEVER".parse::<FailOn>().unwrap(), FailOn::Never);
        assert!("sometimes".parse::<FailOn>().is_err());
    }
}
