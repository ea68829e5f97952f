//! OperationCore - the state machine shared by every adapter
//!
//! The core is created Pending by a registration call and is driven by exactly
//! one adapter. Each transition is reported to the [`StateObserver`] before the
//! transition call returns; the observer is never called with the core's own
//! lock held.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use sharedstate::PortableOperation;
use tracing::{debug, warn};
use uuid::Uuid;

use super::state::OperationState;
use crate::error::{OperationError, PreloadError};

pub type FailureHandler = Box<dyn Fn(&OperationError) + Send + Sync>;

type AttachedHandler = Arc<dyn Fn(&OperationError) + Send + Sync>;

/// Receives every transition of every operation
pub trait StateObserver: Send + Sync {
    fn state_changed(&self, operation: &OperationCore);

    /// Called after failure handlers ran; `handled` is false when none were attached
    fn operation_failed(&self, _operation: &OperationCore, _error: &OperationError, _handled: bool) {}
}

struct Progress {
    state: OperationState,
    started_at: Option<Instant>,
    duration: Duration,
    failure: Option<OperationError>,
}

pub struct OperationCore {
    id: Uuid,
    owner: String,
    name: String,
    progress: Mutex<Progress>,
    failure_handlers: Mutex<Vec<AttachedHandler>>,
    observer: Arc<dyn StateObserver>,
}

impl OperationCore {
    /// Create a Pending operation and report it
    pub fn new(owner: impl Into<String>, name: impl Into<String>, observer: Arc<dyn StateObserver>) -> Arc<Self> {
        let core = Arc::new(Self {
            id: Uuid::now_v7(),
            owner: owner.into(),
            name: name.into(),
            progress: Mutex::new(Progress {
                state: OperationState::Pending,
                started_at: None,
                duration: Duration::ZERO,
                failure: None,
            }),
            failure_handlers: Mutex::new(Vec::new()),
            observer,
        });
        debug!(operation_id = %core.id, owner = %core.owner, operation = %core.name, "OperationCore::new: called");
        core.observer.state_changed(&core);
        core
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> OperationState {
        self.progress().state
    }

    /// Time from Running to the terminal state, zero until then
    pub fn duration(&self) -> Duration {
        self.progress().duration
    }

    pub fn duration_ms(&self) -> u128 {
        self.duration().as_millis()
    }

    pub fn failure(&self) -> Option<OperationError> {
        self.progress().failure.clone()
    }

    pub fn has_failure_handler(&self) -> bool {
        !self.handlers().is_empty()
    }

    pub fn add_failure_handler(&self, handler: FailureHandler) {
        self.handlers().push(Arc::from(handler));
    }

    pub fn snapshot(&self) -> PortableOperation {
        PortableOperation::new(self.id.to_string(), &self.owner, &self.name, self.state().as_str())
    }

    /// Pending → Running, rejecting any other starting state
    pub fn begin(&self) -> Result<(), PreloadError> {
        {
            let mut progress = self.progress();
            match progress.state {
                OperationState::Pending => {
                    progress.state = OperationState::Running;
                    progress.started_at = Some(Instant::now());
                }
                OperationState::Running => {
                    return Err(PreloadError::AlreadyRunning {
                        name: self.name.clone(),
                    });
                }
                state => {
                    return Err(PreloadError::AlreadyFinished {
                        name: self.name.clone(),
                        state,
                    });
                }
            }
        }

        debug!(operation_id = %self.id, "OperationCore::begin: running");
        self.observer.state_changed(self);
        Ok(())
    }

    /// Running → Done; returns false if the operation was not running
    pub fn mark_done(&self) -> bool {
        if !self.finish(OperationState::Done, None) {
            return false;
        }
        self.observer.state_changed(self);
        true
    }

    /// Running → Failed; runs failure handlers, then reports the transition
    pub fn mark_failed(&self, error: OperationError) -> bool {
        if !self.finish(OperationState::Failed, Some(error.clone())) {
            return false;
        }

        // handlers run outside the lock and stay attached
        let handlers = self.handlers().clone();
        let handled = !handlers.is_empty();
        for handler in &handlers {
            handler(&error);
        }

        self.observer.operation_failed(self, &error, handled);
        self.observer.state_changed(self);
        true
    }

    fn finish(&self, state: OperationState, failure: Option<OperationError>) -> bool {
        let mut progress = self.progress();
        if !progress.state.can_transition_to(state) {
            warn!(
                operation_id = %self.id,
                operation = %self.name,
                from = %progress.state,
                to = %state,
                "OperationCore::finish: ignoring invalid transition"
            );
            return false;
        }

        progress.duration = progress.started_at.map(|started| started.elapsed()).unwrap_or_default();
        progress.state = state;
        progress.failure = failure;
        true
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handlers(&self) -> MutexGuard<'_, Vec<AttachedHandler>> {
        self.failure_handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for OperationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCore")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
