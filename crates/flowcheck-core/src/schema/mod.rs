//! Structural and field-level validation of the two artifact kinds.
//!
//! Both validators are batch passes: a defect is recorded as a
//! [`Finding`](crate::report::Finding) and parsing moves on, so one run lists
//! every problem in the artifact.
//!
//! - [`issues`]: JSONL issue sets.
//! - [`plan`]: markdown task plans.

pub mod issues;
pub mod plan;

pub use issues::{IssueSchema, LocatedRecord, ParsedIssues, parse_issues};
pub use plan::{ParsedPlan, parse_depends, parse_plan};
