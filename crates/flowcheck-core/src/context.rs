//! Execution-context resolution for issue sets.
//!
//! `Meta.execution_context` tells the execution driver which worktree and
//! branch a set belongs to. When it is absent, not an object, or missing keys,
//! deterministic fallbacks are substituted:
//!
//! - `worktree_path` = the project root the checker was given
//! - `branch` = the current git branch, or `"unknown"`
//! - `base_branch` = the resolved `branch`
//!
//! Substitution never produces an error; each fallback is recorded so the
//! caller can surface it as an advisory.

use std::path::Path;
use std::process::Command;

use serde::Serialize;
use serde_json::Value;

/// Branch name used when the current branch cannot be determined.
pub const UNKNOWN_BRANCH: &str = "unknown";

/// Source of the current version-control branch.
pub trait BranchProbe {
    /// Current branch of the repository at `root`, or `None` if it cannot be
    /// determined.
    fn current_branch(&self, root: &Path) -> Option<String>;
}

/// Asks `git rev-parse --abbrev-ref HEAD`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitBranchProbe;

impl BranchProbe for GitBranchProbe {
    fn current_branch(&self, root: &Path) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let branch = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if branch.is_empty() { None } else { Some(branch) }
            }
            Ok(out) => {
                tracing::debug!(status = ?out.status, "git could not resolve the current branch");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "git is not available");
                None
            }
        }
    }
}

/// A fully populated execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    pub worktree_path: String,
    pub branch: String,
    pub base_branch: String,
}

/// Why a fallback value was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// `execution_context` is absent.
    Missing,
    /// `execution_context` is present but not an object.
    NotAnObject,
    /// One key is absent or blank.
    Field(&'static str),
}

/// Resolved context plus the fallbacks that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContext {
    pub context: ExecutionContext,
    pub fallbacks: Vec<Fallback>,
}

const KEYS: [&str; 3] = ["worktree_path", "branch", "base_branch"];

/// Resolve the execution context of an issue set.
///
/// The branch probe is only consulted when a branch value is actually needed.
pub fn resolve(raw: Option<&Value>, project_root: &Path, probe: &dyn BranchProbe) -> ResolvedContext {
    let mut fallbacks = Vec::new();
    let authored = match raw {
        None | Some(Value::Null) => {
            fallbacks.push(Fallback::Missing);
            None
        }
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            fallbacks.push(Fallback::NotAnObject);
            None
        }
    };

    let lookup = |key: &str| -> Option<String> {
        let map = authored?;
        let text = match map.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if text.is_empty() { None } else { Some(text) }
    };

    let [worktree_key, branch_key, base_key] = KEYS;
    let mut values: [Option<String>; 3] = [lookup(worktree_key), lookup(branch_key), lookup(base_key)];
    if authored.is_some() {
        for (key, value) in KEYS.into_iter().zip(values.iter()) {
            if value.is_none() {
                fallbacks.push(Fallback::Field(key));
            }
        }
    }

    let worktree_path = values[0]
        .take()
        .unwrap_or_else(|| project_root.display().to_string());
    let branch = values[1].take().unwrap_or_else(|| {
        probe
            .current_branch(project_root)
            .unwrap_or_else(|| UNKNOWN_BRANCH.to_string())
    });
    let base_branch = values[2].take().unwrap_or_else(|| branch.clone());

    ResolvedContext {
        context: ExecutionContext {
            worktree_path,
            branch,
            base_branch,
        },
        fallbacks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::path::PathBuf;

    struct FixedBranch {
        branch: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl FixedBranch {
        fn new(branch: Option<&'static str>) -> Self {
            Self {
                branch,
                calls: Cell::new(0),
            }
        }
    }

    impl BranchProbe for FixedBranch {
        fn current_branch(&self, _root: &Path) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            self.branch.map(str::to_string)
        }
    }

    fn root() -> PathBuf {
        PathBuf::from("/work/project")
    }

    #[test]
    fn missing_context_uses_root_and_branch() {
        let probe = FixedBranch::new(Some("feature/login"));
        let resolved = resolve(None, &root(), &probe);
        assert_eq!(resolved.fallbacks, vec![Fallback::Missing]);
        assert_eq!(resolved.context.worktree_path, "/work/project");
        assert_eq!(resolved.context.branch, "feature/login");
        assert_eq!(resolved.context.base_branch, "feature/login");
    }

    #[test]
    fn undeterminable_branch_is_unknown() {
        let probe = FixedBranch::new(None);
        let resolved = resolve(Some(&json!("main")), &root(), &probe);
        assert_eq!(resolved.fallbacks, vec![Fallback::NotAnObject]);
        assert_eq!(resolved.context.branch, UNKNOWN_BRANCH);
        assert_eq!(resolved.context.base_branch, UNKNOWN_BRANCH);
    }

    #[test]
    fn partial_context_fills_only_missing_keys() {
        let probe = FixedBranch::new(Some("ignored"));
        let raw = json!({"worktree_path": "/wt", "branch": "feat", "base_branch": "  "});
        let resolved = resolve(Some(&raw), &root(), &probe);
        assert_eq!(resolved.fallbacks, vec![Fallback::Field("base_branch")]);
        assert_eq!(resolved.context.worktree_path, "/wt");
        assert_eq!(resolved.context.base_branch, "feat");
        assert_eq!(probe.calls.get(), 0, "branch was authored, git not needed");
    }

    #[test]
    fn complete_context_is_authored() {
        let probe = FixedBranch::new(None);
        let raw = json!({"worktree_path": "/wt", "branch": "feat", "base_branch": "main"});
        let resolved = resolve(Some(&raw), &root(), &probe);
        assert!(resolved.fallbacks.is_empty());
        assert_eq!(resolved.context.base_branch, "main");
    }

    #[test]
    fn git_probe_outside_a_repository_gives_none() {
        let dir = tempfile::tempdir().unwrap();
        // Either git is missing or the directory is not a repository.
        assert!(GitBranchProbe.current_branch(dir.path()).is_none());
    }
}
