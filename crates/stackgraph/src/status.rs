//! Step status state machine
//!
//! ```text
//! PENDING ──> SUBMITTED ──> COMPLETE | FAILED | SKIPPED
//!    └──────────────────────────────────────> SKIPPED
//! ```
//!
//! Terminal states never change again. `SUBMITTED -> SUBMITTED` is allowed
//! so a long-running action can report progress with a new reason.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons attached to statuses, matched literally by log scrapers.
pub mod reasons {
    pub const CREATING: &str = "creating new stack";
    pub const UPDATING: &str = "updating existing stack";
    pub const RECREATING: &str = "destroying stack for re-creation";
    pub const ROLLING_BACK: &str = "rolling back new stack";
    pub const NO_CHANGE: &str = "nochange";
    pub const LOCKED: &str = "locked";
    pub const DISABLED: &str = "disabled";
    pub const DEPENDENCY_FAILED: &str = "dependency has failed";
    pub const SUBMITTED_FOR_DESTRUCTION: &str = "submitted for destruction";
    pub const DESTROYED: &str = "stack destroyed";
}

/// Ordinal status code without the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    Pending = 0,
    Submitted = 1,
    Complete = 2,
    Skipped = 3,
    Failed = 4,
}

impl StatusCode {
    /// Lowercase name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Skipped | Self::Failed)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current status of a step, with an optional human-readable reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Waiting for dependencies or for a worker slot
    Pending,
    /// Handed to a worker; the action is running
    Submitted { reason: Option<String> },
    /// Action finished successfully
    Complete { reason: Option<String> },
    /// Never ran, or ran and decided there was nothing to do
    Skipped { reason: String },
    /// Action returned an error
    Failed { reason: String },
}

impl Status {
    pub fn submitted(reason: impl Into<String>) -> Self {
        Self::Submitted {
            reason: Some(reason.into()),
        }
    }

    pub fn complete(reason: impl Into<String>) -> Self {
        Self::Complete {
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> StatusCode {
        match self {
            Self::Pending => StatusCode::Pending,
            Self::Submitted { .. } => StatusCode::Submitted,
            Self::Complete { .. } => StatusCode::Complete,
            Self::Skipped { .. } => StatusCode::Skipped,
            Self::Failed { .. } => StatusCode::Failed,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pending => None,
            Self::Submitted { reason } | Self::Complete { reason } => reason.as_deref(),
            Self::Skipped { reason } | Self::Failed { reason } => Some(reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.code().is_terminal()
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &Status) -> bool {
        use StatusCode::{Complete, Failed, Pending, Skipped, Submitted};

        match (self.code(), next.code()) {
            (Pending, Submitted | Skipped | Failed) => true,
            (Submitted, Submitted | Complete | Skipped | Failed) => true,
            _ => false,
        }
    }

    /// Render the status log line for a step, e.g. `vpc:complete (creating new stack)`.
    pub fn log_line(&self, step: &str) -> String {
        match self.reason() {
            Some(reason) => format!("{step}:{} ({reason})", self.code()),
            None => format!("{step}:{}", self.code()),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({reason})", self.code()),
            None => write!(f, "{}", self.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        let terminal = [
            Status::complete(reasons::CREATING),
            Status::failed("boom"),
            Status::skipped(reasons::LOCKED),
        ];
        let targets = [
            Status::Pending,
            Status::Submitted { reason: None },
            Status::complete("again"),
            Status::failed("again"),
            Status::skipped("again"),
        ];
        for from in &terminal {
            for to in &targets {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_pending_can_skip_without_submission() {
        assert!(Status::Pending.can_transition_to(&Status::skipped(reasons::DEPENDENCY_FAILED)));
        assert!(!Status::Pending.can_transition_to(&Status::complete("done")));
    }

    #[test]
    fn test_submitted_progress_updates() {
        let submitted = Status::Submitted { reason: None };
        assert!(submitted.can_transition_to(&Status::submitted(reasons::CREATING)));
        assert!(!submitted.can_transition_to(&Status::Pending));
    }

    #[test]
    fn test_log_lines() {
        assert_eq!(
            Status::submitted(reasons::CREATING).log_line("vpc"),
            "vpc:submitted (creating new stack)"
        );
        assert_eq!(
            Status::skipped(reasons::DEPENDENCY_FAILED).log_line("bastion"),
            "bastion:skipped (dependency has failed)"
        );
        assert_eq!(Status::Complete { reason: None }.log_line("vpc"), "vpc:complete");
    }

    #[test]
    fn test_codes_are_ordered() {
        assert!(StatusCode::Pending < StatusCode::Submitted);
        assert!(StatusCode::Skipped < StatusCode::Failed);
        assert_eq!(StatusCode::Failed as u8, 4);
    }
}
