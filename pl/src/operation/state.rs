//! OperationState - lifecycle of one unit of preloading work

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sharedstate::{STATE_DONE, STATE_FAILED, STATE_PENDING, STATE_RUNNING};

/// Pending → Running → Done | Failed, never backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    Pending,
    Running,
    Done,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether moving to `next` keeps the lifecycle monotonic
    pub fn can_transition_to(self, next: OperationState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Done) | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => STATE_PENDING,
            Self::Running => STATE_RUNNING,
            Self::Done => STATE_DONE,
            Self::Failed => STATE_FAILED,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATE_PENDING => Ok(Self::Pending),
            STATE_RUNNING => Ok(Self::Running),
            STATE_DONE => Ok(Self::Done),
            STATE_FAILED => Ok(Self::Failed),
            other => Err(format!("Unknown operation state: {other}")),
        }
    }
}
