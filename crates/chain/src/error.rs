//! Chain error types.

use std::time::Duration;

use thiserror::Error;

/// Why a single collaborator call did not succeed.
///
/// The orchestrator turns every one of these into a failed
/// [`ChainCallResult`](crate::ChainCallResult); they never reach its caller.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Network failure talking to the collaborator.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The collaborator did not answer within the bound.
    #[error("Call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// No collaborator is registered under this name.
    #[error("Unknown collaborator '{0}'")]
    UnknownCollaborator(String),

    /// A non-2xx answer where a 2xx was required (event mesh egress).
    #[error("Collaborator responded with status {0}")]
    Status(u16),
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
