//! Domain error types.

use broker::BrokerError;
use consumer::HandlerError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed a business rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A repository could not read or write.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The domain event could not be published.
    #[error("Publish error: {0}")]
    Publish(#[from] BrokerError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(e: sqlx::Error) -> Self {
        DomainError::Persistence(e.to_string())
    }
}

impl From<DomainError> for HandlerError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(reason) => HandlerError::Rejected(reason),
            other => HandlerError::Failed(other.to_string()),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
