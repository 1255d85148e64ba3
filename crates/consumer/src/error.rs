//! Consumer error types.

use thiserror::Error;

use crate::ConsumerState;

/// Errors returned by [`ConsumerLoop`](crate::ConsumerLoop) operations.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// An operation was attempted in a state that does not allow it.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConsumerState,
    },

    /// The underlying broker client failed.
    #[error("Broker error: {0}")]
    Broker(#[from] broker::BrokerError),

    /// The broker ended the subscription without a shutdown request.
    #[error("Message stream closed unexpectedly")]
    StreamClosed,
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Failure reported by an event handler.
///
/// Handler failures are logged and counted by the loop; they never stop it.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event was understood but rejected (e.g. a business rule failed).
    #[error("Event rejected: {0}")]
    Rejected(String),

    /// Processing failed, e.g. the store was unreachable.
    #[error("Handler failed: {0}")]
    Failed(String),

    /// The handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
