//! Manual adapter - the plugin reports completion itself

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::Adapter;
use super::core::OperationCore;
use crate::error::OperationError;

#[derive(Debug, Clone, Copy, Default)]
pub struct Manual;

impl Adapter for Manual {
    type Started = OperationHandle;

    fn launch(&self, core: Arc<OperationCore>) -> OperationHandle {
        OperationHandle { core, closed: false }
    }
}

/// Scoped handle on a running operation
///
/// Dropping the handle without closing it marks the operation Done, or
/// Failed when the drop happens while the thread is panicking.
#[derive(Debug)]
pub struct OperationHandle {
    core: Arc<OperationCore>,
    closed: bool,
}

impl OperationHandle {
    pub fn id(&self) -> Uuid {
        self.core.id()
    }

    pub fn complete(mut self) {
        self.closed = true;
        self.core.mark_done();
    }

    pub fn fail(mut self, error: impl Into<OperationError>) {
        self.closed = true;
        self.core.mark_failed(error.into());
    }

    /// Close with the outcome of the work
    pub fn close<E: Into<OperationError>>(self, result: Result<(), E>) {
        match result {
            Ok(()) => self.complete(),
            Err(e) => self.fail(e),
        }
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if std::thread::panicking() {
            warn!(operation_id = %self.core.id(), "OperationHandle::drop: dropped while panicking");
            self.core
                .mark_failed(OperationError::Panicked("handle dropped during a panic".to_string()));
        } else {
            debug!(operation_id = %self.core.id(), "OperationHandle::drop: closing as done");
            self.core.mark_done();
        }
    }
}
