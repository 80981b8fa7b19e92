use std::fmt;

/// Machine-readable error codes for runtime failures of the checker itself.
///
/// Data findings (schema, reference, cycle, coherence) are reported through
/// [`crate::report::Finding`]; these codes only describe why a command could
/// not do its job, so a caller can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ArtifactUnreadable,
    ConfigParseError,
    RecordNotFound,
    InvalidStateTransition,
    CycleDetected,
    InvalidUpdate,
    MalformedArtifact,
    TempValidationFailed,
    Unrecoverable,
    WriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ArtifactUnreadable => "E1001",
            Self::ConfigParseError => "E1002",
            Self::RecordNotFound => "E2001",
            Self::InvalidStateTransition => "E2002",
            Self::CycleDetected => "E2003",
            Self::InvalidUpdate => "E2005",
            Self::MalformedArtifact => "E3001",
            Self::TempValidationFailed => "E3002",
            Self::Unrecoverable => "E3003",
            Self::WriteFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ArtifactUnreadable => "Artifact could not be read",
            Self::ConfigParseError => "Config file parse error",
            Self::RecordNotFound => "Issue record not found",
            Self::InvalidStateTransition => "Invalid state transition",
            Self::CycleDetected => "Dependency cycle detected",
            Self::InvalidUpdate => "Invalid field update",
            Self::MalformedArtifact => "Malformed issue-set file",
            Self::TempValidationFailed => "Staged file failed validation",
            Self::Unrecoverable => "Issue-set file cannot be recovered",
            Self::WriteFailed => "Issue-set write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ArtifactUnreadable => Some("Check the path and read permissions."),
            Self::ConfigParseError => Some("Fix syntax in the flowcheck config file and retry."),
            Self::RecordNotFound => Some("Use an id that exists in the issue set."),
            Self::InvalidStateTransition => Some(
                "States only move pending -> in_progress -> done; reopen by resetting to pending with git_state=uncommitted and blocked=false.",
            ),
            Self::CycleDetected => Some("Remove/adjust depends_on links to keep the graph acyclic."),
            Self::InvalidUpdate => Some(
                "Use field=value with one of: dev_state, review_initial_state, review_regression_state, git_state, blocked, owner, notes.",
            ),
            Self::MalformedArtifact => {
                Some("Run `flowcheck check --mode issues` to list the defective lines.")
            }
            Self::TempValidationFailed => Some("The original file was left untouched; retry once."),
            Self::Unrecoverable => Some("Restore the issue set from version control."),
            Self::WriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
