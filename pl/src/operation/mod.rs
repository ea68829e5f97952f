//! Operations - units of preloading work and the adapters that drive them
//!
//! Every operation shares one state machine ([`OperationCore`]). Adapters
//! only differ in how the work is run:
//!
//! - [`Manual`]: the plugin holds an [`OperationHandle`] and closes it
//! - [`Spawned`]: an async callable runs as a task, awaited via [`OperationTask`]
//! - step sequences: adapted into [`Spawned`] and driven on a single context
//!
//! ```text
//!   register_* ──▶ PreloadingOperation<A> ──start()──▶ A::Started
//!                        │                              │
//!                        └──── OperationCore ◀──────────┘
//!                                  │ every transition
//!                                  ▼
//!                            StateObserver (coordinator)
//! ```

mod core;
mod handle;
mod sequence;
mod state;
mod task;

use std::sync::Arc;

use tracing::debug;

pub use self::core::{FailureHandler, OperationCore, StateObserver};
pub use handle::{Manual, OperationHandle};
pub use sequence::{Sequence, Step, into_callable};
pub use state::OperationState;
pub use task::{Callable, Execution, OperationTask, Spawned, callable};

use crate::error::{OperationError, PreloadError};

/// How an adapter turns a started operation into something the caller holds
pub trait Adapter: Send + Sync {
    type Started;

    /// Whether the work can be launched from here; checked before Running
    fn check(&self, _core: &OperationCore) -> Result<(), PreloadError> {
        Ok(())
    }

    /// Called once, right after the core moved to Running
    fn launch(&self, core: Arc<OperationCore>) -> Self::Started;
}

/// A registered operation waiting to be started
pub struct PreloadingOperation<A: Adapter> {
    core: Arc<OperationCore>,
    adapter: A,
}

pub type HandleOperation = PreloadingOperation<Manual>;
pub type FutureOperation = PreloadingOperation<Spawned>;

impl<A: Adapter> PreloadingOperation<A> {
    pub(crate) fn new(core: Arc<OperationCore>, adapter: A) -> Self {
        Self { core, adapter }
    }

    /// Move to Running and launch the work
    ///
    /// Fails when the operation was already started, or when the adapter
    /// cannot launch it from the calling context; the operation then stays
    /// Pending.
    pub fn start(&self) -> Result<A::Started, PreloadError> {
        debug!(operation_id = %self.core.id(), operation = %self.core.name(), "PreloadingOperation::start: called");
        self.adapter.check(&self.core)?;
        self.core.begin()?;
        Ok(self.adapter.launch(Arc::clone(&self.core)))
    }

    /// Attach a failure callback
    ///
    /// Operations with at least one callback are not surfaced as a blocking
    /// error dialog; the callback owns the reaction.
    pub fn on_failure<F>(self, handler: F) -> Self
    where
        F: Fn(&OperationError) + Send + Sync + 'static,
    {
        self.core.add_failure_handler(Box::new(handler));
        self
    }

    pub fn core(&self) -> &Arc<OperationCore> {
        &self.core
    }

    pub fn state(&self) -> OperationState {
        self.core.state()
    }
}

impl<A: Adapter> std::fmt::Debug for PreloadingOperation<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadingOperation").field("core", &self.core).finish_non_exhaustive()
    }
}
