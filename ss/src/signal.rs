//! Signal - callback registry kept in the shared state
//!
//! Subscribers run with the store guard that the emitter already holds, so a
//! subscriber can read and write cells but must never call `SharedStore::lock`.
//! Emitters clone the signal out of its cell first and then emit, which keeps
//! the borrow of the cell value separate from the guard handed to subscribers.

use std::sync::Arc;

use tracing::debug;

use crate::store::StoreGuard;

pub type Subscriber = Arc<dyn Fn(&mut StoreGuard<'_>) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Signal {
    subscribers: Vec<(String, Subscriber)>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a labelled subscriber; labels only show up in logs
    pub fn subscribe<F>(&mut self, label: impl Into<String>, subscriber: F)
    where
        F: Fn(&mut StoreGuard<'_>) + Send + Sync + 'static,
    {
        let label = label.into();
        debug!(%label, "Signal::subscribe: called");
        self.subscribers.push((label, Arc::new(subscriber)));
    }

    /// Call every subscriber in subscription order
    pub fn emit(&self, guard: &mut StoreGuard<'_>) {
        debug!(subscribers = self.subscribers.len(), "Signal::emit: called");
        for (label, subscriber) in &self.subscribers {
            debug!(%label, "Signal::emit: notifying subscriber");
            subscriber(guard);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.subscribers.iter().map(|(label, _)| label.as_str()).collect();
        f.debug_struct("Signal").field("subscribers", &labels).finish()
    }
}
