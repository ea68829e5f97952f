//! Shared state error types

use thiserror::Error;

/// Errors from shared state access
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Key {key} holds a value that is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Key {key} has no value and no registered initializer")]
    NoInitializer { key: String },

    #[error("Shared state unavailable: {0}")]
    Unavailable(String),
}
