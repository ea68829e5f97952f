//! PortableOperation - operation snapshot that crosses copy boundaries
//!
//! The operation types of each preloader copy are distinct, so the shared list
//! and the presentation binding only ever hold this flat projection. The state
//! is carried as its display string.

use serde::{Deserialize, Serialize};

pub const STATE_PENDING: &str = "Pending";
pub const STATE_RUNNING: &str = "Running";
pub const STATE_DONE: &str = "Done";
pub const STATE_FAILED: &str = "Failed";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableOperation {
    pub id: String,
    pub owner: String,
    pub operation_name: String,
    pub state: String,
}

impl PortableOperation {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        operation_name: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            operation_name: operation_name.into(),
            state: state.into(),
        }
    }

    /// Done or Failed
    pub fn is_terminal(&self) -> bool {
        self.state == STATE_DONE || self.state == STATE_FAILED
    }

    pub fn is_failed(&self) -> bool {
        self.state == STATE_FAILED
    }

    pub fn is_running(&self) -> bool {
        self.state == STATE_RUNNING
    }
}
