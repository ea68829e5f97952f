//! MainContext - a dedicated single-threaded executor
//!
//! ```text
//!   caller ──spawn(fut)──▶ Handle ──▶ [main-context thread]
//!                                     current_thread runtime
//!                                     block_on(shutdown_rx)
//! ```
//!
//! Tasks spawned here all run on one thread, one step at a time, which is
//! what step sequences expect from the host's main loop.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct MainContext {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    handle: Handle,
    thread_id: ThreadId,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MainContext {
    /// Start the executor thread
    pub fn start(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        debug!(%name, "MainContext::start: called");

        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread_name = name.clone();
        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(name = %thread_name, "MainContext: thread running");
            let _ = runtime.block_on(shutdown_rx);
            debug!(name = %thread_name, "MainContext: thread stopping");
        })?;

        info!(%name, "MainContext::start: started");
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                handle,
                thread_id: thread.thread().id(),
                shutdown: Mutex::new(Some(shutdown_tx)),
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Run `future` on the main-context thread
    pub fn spawn<F>(&self, future: F) -> task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.handle.spawn(future)
    }

    /// Whether the calling thread is the main-context thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Stop the executor; tasks that have not finished are dropped
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Inner {
    fn shutdown(&self) {
        let sender = self.shutdown.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(sender) = sender {
            debug!(name = %self.name, "MainContext::shutdown: called");
            let _ = sender.send(());
        }

        if thread::current().id() == self.thread_id {
            return;
        }
        let thread = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(thread) = thread
            && thread.join().is_err()
        {
            warn!(name = %self.name, "MainContext::shutdown: executor thread panicked");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for MainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContext").field("name", &self.inner.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tasks_run_on_main_thread() {
        let context = MainContext::start("test-main").unwrap();
        let probe = context.clone();

        let (name, on_main) = context
            .spawn(async move { (thread::current().name().map(String::from), probe.is_current()) })
            .await
            .unwrap();

        assert_eq!(name.as_deref(), Some("test-main"));
        assert!(on_main);
        assert!(!context.is_current());
    }

    #[tokio::test]
    async fn test_tasks_share_one_thread() {
        let context = MainContext::start("test-serial").unwrap();
        let first = context.spawn(async { thread::current().id() });
        let second = context.spawn(async { thread::current().id() });

        assert_eq!(first.await.unwrap(), second.await.unwrap());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let context = MainContext::start("test-shutdown").unwrap();
        context.shutdown();
        context.shutdown();
        assert_eq!(context.name(), "test-shutdown");
    }
}
