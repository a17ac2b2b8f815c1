//! Sequence lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one sequence execution.
///
/// `Unsynchronized -> Synchronized -> Running -> Completed | Aborted`;
/// a finished sequence may be synchronized again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceState {
    #[default]
    Unsynchronized,
    Synchronized,
    Running,
    Completed,
    Aborted,
}

impl SequenceState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unsynchronized => "unsynchronized",
            Self::Synchronized => "synchronized",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether `synchronize` may be called from this state.
    pub const fn can_synchronize(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
