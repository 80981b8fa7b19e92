//! flowcheck-core library.
//!
//! Validates the two artifacts of a plan-driven workflow (a markdown plan and
//! the JSONL issue set compiled from it) and owns the only sanctioned write
//! path into an issue set.
//!
//! - [`check`] runs the validation pipeline and produces [`report::Report`]s.
//! - [`store`] applies field updates atomically; [`recovery`] repairs the
//!   file after a crash mid-update.
//! - [`graph`] detects dependency cycles and computes the canonical order.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums in the library, `anyhow::Result` at the
//!   configuration boundary and in the binary.
//! - **Logging**: `tracing` macros only; the binary owns the subscriber.

#![allow(clippy::module_name_repetitions)]

pub mod check;
pub mod coherence;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod jsonl;
pub mod model;
pub mod recovery;
pub mod report;
pub mod resolve;
pub mod schema;
pub mod store;

