use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

/// Scheduling priority; `P0` is the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

impl Priority {
    /// Every accepted spelling, in rank order.
    pub const VALUES: [&'static str; 3] = ["P0", "P1", "P2"];

    const fn as_str(self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
        }
    }
}

/// Progress of one stage (development, initial review, regression review).
///
/// Variants are declared in their canonical order, so `Ord` is the
/// monotonic order `pending < in_progress < done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    InProgress,
    Done,
}

impl StageState {
    pub const VALUES: [&'static str; 3] = ["pending", "in_progress", "done"];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

/// Whether the work for a record has been committed to version control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitState {
    Uncommitted,
    Committed,
}

impl GitState {
    pub const VALUES: [&'static str; 2] = ["uncommitted", "committed"];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Uncommitted => "uncommitted",
            Self::Committed => "committed",
        }
    }
}

/// The three stage fields of an [`IssueRecord`], used to name a stage in
/// findings and transition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dev,
    ReviewInitial,
    ReviewRegression,
}

impl Stage {
    pub const ALL: [Self; 3] = [Self::Dev, Self::ReviewInitial, Self::ReviewRegression];

    /// JSON field name carrying this stage.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Dev => "dev_state",
            Self::ReviewInitial => "review_initial_state",
            Self::ReviewRegression => "review_regression_state",
        }
    }
}

/// A record's `phase`. Kept as the original JSON number so a rewritten line
/// does not turn `1` into `1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phase(pub Number);

impl Phase {
    /// Numeric value used for ordering. Non-finite values sort last.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.0.as_f64().unwrap_or(f64::MAX)
    }
}

impl From<u32> for Phase {
    fn from(value: u32) -> Self {
        Self(Number::from(value))
    }
}

/// One unit of trackable work: a non-header line of an issue set.
///
/// Every field listed here is required on disk. Fields the schema does not
/// know about are kept in `extra` so rewriting a record never drops data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: String,
    pub priority: Priority,
    pub phase: Phase,
    pub area: String,
    pub title: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub acceptance_criteria: String,
    pub test_approach: String,
    pub review_initial_requirements: String,
    pub review_regression_requirements: String,
    pub dev_state: StageState,
    pub review_initial_state: StageState,
    pub review_regression_state: StageState,
    pub git_state: GitState,
    pub blocked: bool,
    pub owner: String,
    pub refs: Vec<String>,
    pub notes: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl IssueRecord {
    /// Current value of one stage field.
    #[must_use]
    pub const fn stage(&self, stage: Stage) -> StageState {
        match stage {
            Stage::Dev => self.dev_state,
            Stage::ReviewInitial => self.review_initial_state,
            Stage::ReviewRegression => self.review_regression_state,
        }
    }

    /// Mutable access to one stage field.
    pub const fn stage_mut(&mut self, stage: Stage) -> &mut StageState {
        match stage {
            Stage::Dev => &mut self.dev_state,
            Stage::ReviewInitial => &mut self.review_initial_state,
            Stage::ReviewRegression => &mut self.review_regression_state,
        }
    }

    /// `true` when all three stages are done, the work is committed and
    /// nothing blocks it.
    #[must_use]
    pub fn is_closed_loop_complete(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|stage| self.stage(*stage) == StageState::Done)
            && self.git_state == GitState::Committed
            && !self.blocked
    }
}

/// Header line of an issue set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "type")]
    pub kind: String,
    pub plan: String,
    pub goal: String,
    pub tech_stack: String,
    /// Path of the plan this set was compiled from, relative to the project root.
    pub source: String,
    pub total_issues: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Meta {
    /// Value required in the `type` field.
    pub const KIND: &'static str = "meta";
}

/// Meta header plus records in canonical (file) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSet {
    pub meta: Meta,
    pub records: Vec<IssueRecord>,
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for GitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "P0" => Ok(Self::P0),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for StageState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(ParseEnumError {
                expected: "stage state",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for GitState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "uncommitted" => Ok(Self::Uncommitted),
            "committed" => Ok(Self::Committed),
            _ => Err(ParseEnumError {
                expected: "git state",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": "AUTH-010",
            "priority": "P1",
            "phase": 1.1,
            "area": "backend",
            "title": "Login endpoint",
            "description": "Add POST /login",
            "depends_on": [],
            "acceptance_criteria": "returns a token",
            "test_approach": "cargo test",
            "review_initial_requirements": "dev flow",
            "review_regression_requirements": "regression flow",
            "dev_state": "in_progress",
            "review_initial_state": "pending",
            "review_regression_state": "pending",
            "git_state": "uncommitted",
            "blocked": false,
            "owner": "agent",
            "refs": ["docs/plans/auth.md:10-20"],
            "notes": "",
            "labels": ["auth"]
        })
    }

    #[test]
    fn enum_json_spellings() {
        assert_eq!(serde_json::to_string(&Priority::P0).unwrap(), "\"P0\"");
        assert_eq!(
            serde_json::to_string(&StageState::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&GitState::Committed).unwrap(),
            "\"committed\""
        );
        assert!(serde_json::from_str::<StageState>("\"IN_PROGRESS\"").is_err());
    }

    #[test]
    fn stage_order_is_canonical() {
        assert!(StageState::Pending < StageState::InProgress);
        assert!(StageState::InProgress < StageState::Done);
        assert!(Priority::P0 < Priority::P2);
    }

    #[test]
    fn record_keeps_unknown_fields() {
        let record: IssueRecord = serde_json::from_value(sample()).unwrap();
        assert_eq!(record.extra.get("labels"), Some(&json!(["auth"])));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["labels"], json!(["auth"]));
    }

    #[test]
    fn integer_phase_is_not_rewritten_as_float() {
        let mut value = sample();
        value["phase"] = json!(2);
        let record: IssueRecord = serde_json::from_value(value).unwrap();
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"phase\":2,"), "line: {line}");
        assert!((record.phase.value() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn closed_loop_requires_every_condition() {
        let mut record: IssueRecord = serde_json::from_value(sample()).unwrap();
        assert!(!record.is_closed_loop_complete());

        for stage in Stage::ALL {
            *record.stage_mut(stage) = StageState::Done;
        }
        record.git_state = GitState::Committed;
        assert!(record.is_closed_loop_complete());

        record.blocked = true;
        assert!(!record.is_closed_loop_complete());
    }

    #[test]
    fn from_str_rejects_unknown_values() {
        assert_eq!("done".parse::<StageState>().unwrap(), StageState::Done);
        assert_eq!(" P2 ".parse::<Priority>().unwrap(), Priority::P2);
        let err = "finished".parse::<StageState>().unwrap_err();
        assert_eq!(err.to_string(), "invalid stage state: 'finished'");
        assert!("P3".parse::<Priority>().is_err());
        assert!("pushed".parse::<GitState>().is_err());
    }
}
