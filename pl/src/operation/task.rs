//! Spawned adapter - an async callable run as a task

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Adapter;
use super::core::OperationCore;
use crate::error::{OperationError, PreloadError};
use crate::main_context::MainContext;

/// Zero-argument async work
pub type Callable = Box<dyn FnOnce() -> BoxFuture<'static, eyre::Result<()>> + Send>;

/// Box an async closure into a [`Callable`]
pub fn callable<F, Fut>(f: F) -> Callable
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

/// Where a spawned operation runs
#[derive(Debug, Clone)]
pub enum Execution {
    /// The runtime's worker pool (`tokio::spawn`)
    WorkerPool,
    /// The caller's runtime; on a current-thread runtime that is the calling thread
    Current,
    /// A dedicated single-threaded context
    Main(MainContext),
}

impl Execution {
    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match self {
            Self::WorkerPool | Self::Current => tokio::spawn(future),
            Self::Main(context) => context.spawn(future),
        }
    }
}

pub struct Spawned {
    callable: Mutex<Option<Callable>>,
    execution: Execution,
}

impl Spawned {
    pub fn new(callable: Callable, execution: Execution) -> Self {
        Self {
            callable: Mutex::new(Some(callable)),
            execution,
        }
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }
}

impl Adapter for Spawned {
    type Started = OperationTask;

    fn check(&self, core: &OperationCore) -> Result<(), PreloadError> {
        match &self.execution {
            Execution::Main(_) => Ok(()),
            Execution::WorkerPool | Execution::Current => Handle::try_current().map(|_| ()).map_err(|e| {
                warn!(operation_id = %core.id(), error = %e, "Spawned::check: no runtime to launch on");
                PreloadError::NoRuntime {
                    name: core.name().to_string(),
                }
            }),
        }
    }

    fn launch(&self, core: Arc<OperationCore>) -> OperationTask {
        let id = core.id();
        let callable = self.callable.lock().unwrap_or_else(|p| p.into_inner()).take();
        let guard = Completion { core: Some(core) };

        debug!(operation_id = %id, execution = ?self.execution, "Spawned::launch: called");
        let join = self.execution.spawn(async move {
            let Some(callable) = callable else {
                return guard.fail(OperationError::Abandoned("callable was already consumed".to_string()));
            };

            match AssertUnwindSafe(async move { callable().await }).catch_unwind().await {
                Ok(Ok(())) => guard.done(),
                Ok(Err(report)) => guard.fail(OperationError::from(report)),
                Err(payload) => guard.fail(OperationError::from_panic(payload)),
            }
        });

        OperationTask { id, join }
    }
}

/// Reports the terminal state exactly once, even if the task is dropped
struct Completion {
    core: Option<Arc<OperationCore>>,
}

impl Completion {
    fn done(mut self) -> Result<(), OperationError> {
        if let Some(core) = self.core.take() {
            core.mark_done();
        }
        Ok(())
    }

    fn fail(mut self, error: OperationError) -> Result<(), OperationError> {
        if let Some(core) = self.core.take() {
            core.mark_failed(error.clone());
        }
        Err(error)
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            warn!(operation_id = %core.id(), "Completion::drop: task dropped before finishing");
            core.mark_failed(OperationError::Abandoned("task was dropped before finishing".to_string()));
        }
    }
}

/// Future resolving to the operation's outcome
///
/// Dropping it does not stop the operation; the task keeps running and still
/// reports its terminal state.
pub struct OperationTask {
    id: Uuid,
    join: JoinHandle<Result<(), OperationError>>,
}

impl OperationTask {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for OperationTask {
    type Output = Result<(), OperationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.join).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(OperationError::Abandoned(e.to_string()))),
        }
    }
}

impl std::fmt::Debug for OperationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTask").field("id", &self.id).finish_non_exhaustive()
    }
}
