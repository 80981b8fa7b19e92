use serde::Serialize;

use super::issue::Priority;

/// Header fields every plan document must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanHeader {
    pub goal: Option<String>,
    pub architecture: Option<String>,
    pub tech_stack: Option<String>,
    pub execution_context: Option<String>,
}

/// One `### Task <N>: <title>` section of a plan.
///
/// Plans are authored by the planning stage and are read-only here, so
/// metadata fields stay optional: a missing field is a finding, not a parse
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanTask {
    /// Task number as written (`2`, `2.1`); doubles as the task's phase.
    pub number: String,
    pub title: String,
    /// 1-based line of the section header.
    pub line: usize,
    pub priority: Option<Priority>,
    pub area: Option<String>,
    /// Task numbers this task depends on, in the order written.
    pub depends_on: Vec<String>,
    pub acceptance_criteria: Option<String>,
    pub review_dev: Option<String>,
    pub review_regression: Option<String>,
    pub has_files: bool,
}

impl PlanTask {
    /// Numeric phase used for ordering.
    #[must_use]
    pub fn phase(&self) -> f64 {
        self.number.parse().unwrap_or(f64::MAX)
    }
}

/// A parsed plan document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub header: PlanHeader,
    pub tasks: Vec<PlanTask>,
}
