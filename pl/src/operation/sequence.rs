//! Step sequences - cooperative work split into small steps
//!
//! A sequence is an iterator of steps. Between two steps control goes back to
//! the driving context, so a long sequence never monopolizes it. An `Err` item
//! fails the operation with that cause.

use std::time::Duration;

use tracing::debug;

use super::task::{Callable, callable};

/// What the sequence wants before its next step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Resume on the next turn of the driving context
    Continue,
    /// Resume after the given delay
    Sleep(Duration),
}

pub type Sequence = Box<dyn Iterator<Item = eyre::Result<Step>> + Send>;

/// Adapt a sequence into a callable for the spawned adapter
pub fn into_callable(sequence: Sequence) -> Callable {
    callable(move || async move {
        let mut steps = 0usize;
        for step in sequence {
            steps += 1;
            match step? {
                Step::Continue => tokio::task::yield_now().await,
                Step::Sleep(delay) => tokio::time::sleep(delay).await,
            }
        }
        debug!(steps, "into_callable: sequence finished");
        Ok(())
    })
}
