//! Subcommand handlers. Each returns the process exit status for its run;
//! runtime failures are returned as errors and mapped to exit 3 by `main`.

pub mod check;
pub mod completions;
pub mod order;
pub mod recover;
pub mod update;
