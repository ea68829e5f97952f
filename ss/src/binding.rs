//! Binding - named reactive value for presentation layers
//!
//! Backed by a `tokio::sync::watch` channel: writers modify in place,
//! readers take snapshots or subscribe for change notifications. Dropping the
//! last receiver does not close the binding.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

pub struct Binding<T> {
    channel: String,
    tx: Arc<watch::Sender<T>>,
}

impl<T> Binding<T> {
    pub fn new(channel: impl Into<String>, initial: T) -> Self {
        let channel = channel.into();
        debug!(%channel, "Binding::new: called");
        Self {
            channel,
            tx: Arc::new(watch::Sender::new(initial)),
        }
    }

    /// The fixed name presentation layers look this binding up by
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Mutate the value and wake every subscriber
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Binding<T> {
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> std::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding").field("channel", &self.channel).finish_non_exhaustive()
    }
}
