//! Typed representation of the two workflow artifacts.
//!
//! - [`issue`]: the line-oriented issue set: [`Meta`] header plus
//!   [`IssueRecord`]s, and the status enums they carry.
//! - [`plan`]: the markdown task plan: header fields plus [`PlanTask`]s.

pub mod issue;
pub mod plan;

pub use issue::{
    GitState, IssueRecord, IssueSet, Meta, ParseEnumError, Phase, Priority, Stage, StageState,
};
pub use plan::{Plan, PlanHeader, PlanTask};
