//! Preloader error types

use std::sync::Arc;

use sharedstate::StateError;
use thiserror::Error;

use crate::operation::OperationState;

/// Why an operation ended up Failed
///
/// Cloneable so the same cause can be stored on the operation, handed to
/// failure callbacks and re-raised to whoever awaits the operation.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// Failure reported by the plugin through its handle
    #[error("{0}")]
    Reported(String),

    /// The callable or sequence returned an error
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Operation panicked: {0}")]
    Panicked(String),

    /// The driving task went away before reporting a result
    #[error("Operation abandoned: {0}")]
    Abandoned(String),
}

impl OperationError {
    pub fn reported(message: impl Into<String>) -> Self {
        Self::Reported(message.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

impl From<eyre::Report> for OperationError {
    fn from(report: eyre::Report) -> Self {
        let message = format!("{report:#}");
        let source: Box<dyn std::error::Error + Send + Sync + 'static> = report.into();
        Self::Failed {
            message,
            source: Arc::from(source),
        }
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::Reported(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::Reported(message.to_string())
    }
}

/// Misuse of the registration API
#[derive(Debug, Error)]
pub enum PreloadError {
    #[error("Operation {name} is already running")]
    AlreadyRunning { name: String },

    #[error("Operation {name} already finished as {state}")]
    AlreadyFinished { name: String, state: OperationState },

    #[error("Operation {name} cannot start outside a tokio runtime")]
    NoRuntime { name: String },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Failures at the host boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Host is in an unexpected phase: {0}")]
    UnexpectedPhase(String),

    #[error("Host does not support {0}")]
    Unsupported(String),

    #[error("Host error: {0}")]
    Other(String),
}
