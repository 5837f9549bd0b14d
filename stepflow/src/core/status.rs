//! Step status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for dependencies.
    #[default]
    Pending,
    /// All dependencies satisfied, not yet dispatched.
    Ready,
    /// Dispatched and awaiting completion.
    Running,
    /// Completed successfully.
    Ok,
    /// Condition evaluated false; not executed.
    Skip,
    /// Failed terminally.
    Fail,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StepStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip | Self::Fail)
    }

    /// Returns true if dependents may run after this outcome.
    #[must_use]
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }
}
