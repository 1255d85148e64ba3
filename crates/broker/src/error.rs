use thiserror::Error;

/// Errors raised by broker clients and the components built on them.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker (or its administrative interface) could not be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// A message could not be delivered to a topic.
    #[error("Failed to publish to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Subscribing a consumer group to topics failed.
    #[error("Failed to subscribe: {0}")]
    Subscribe(String),

    /// A network-level failure while talking to the broker.
    #[error("Broker transport error: {0}")]
    Transport(String),

    /// A topic creation request named a topic that already exists.
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// A topic specification with a non-positive setting.
    #[error("Invalid topic spec for '{topic}': {reason}")]
    InvalidTopicSpec { topic: String, reason: String },

    /// An inbound event that cannot be turned into an envelope.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The client was used before `connect`.
    #[error("Broker client is not connected")]
    NotConnected,

    /// The client was used after `close`/`disconnect`.
    #[error("Broker client has been closed")]
    Closed,
}

impl BrokerError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent(reason.into())
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
