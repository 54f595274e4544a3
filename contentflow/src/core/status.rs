//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a stage within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is waiting for its level.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed and produced an output.
    Completed,
    /// Stage execution failed.
    Failed,
    /// Stage was never invoked (upstream failure or cancellation).
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    ///
    /// Statuses never regress from a terminal state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => !matches!(next, Self::Pending),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Skipped => false,
        }
    }
}
