use std::sync::Arc;

use async_trait::async_trait;

use crate::{BrokerMessage, OutboundMessage, Result, TopicSpec};

/// Administrative access to the broker: topic listing and creation.
///
/// A session is bracketed by `connect`/`disconnect`; callers must disconnect
/// even when an operation in between fails.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Opens an administrative session. Fails with `Unavailable` when the
    /// broker cannot be reached.
    async fn connect(&self) -> Result<()>;

    /// Names of every topic currently known to the broker.
    async fn list_topics(&self) -> Result<Vec<String>>;

    /// Creates the given topics.
    ///
    /// With `wait_for_leaders`, returns only once every partition of the new
    /// topics has an elected leader.
    async fn create_topics(&self, topics: &[TopicSpec], wait_for_leaders: bool) -> Result<()>;

    /// Closes the session. Safe to call when not connected.
    async fn disconnect(&self) -> Result<()>;
}

/// Sends messages to topics.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    async fn connect(&self) -> Result<()>;

    /// Sends one message and waits for the broker acknowledgement.
    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<()>;

    /// Flushes pending messages and releases the connection.
    async fn disconnect(&self) -> Result<()>;
}

/// Receives messages as a member of a consumer group.
#[async_trait]
pub trait BrokerConsumer: Send + Sync {
    async fn connect(&self) -> Result<()>;

    /// Joins the group's subscription to `topics`.
    async fn subscribe(&self, topics: &[String]) -> Result<()>;

    /// Waits for the next message on any subscribed topic.
    ///
    /// Returns `Closed` once the consumer has been disconnected.
    async fn recv(&self) -> Result<BrokerMessage>;

    async fn disconnect(&self) -> Result<()>;
}

macro_rules! forward_pointer_impls {
    ($($ptr:ident),*) => {$(
        #[async_trait]
        impl<T: BrokerAdmin + ?Sized> BrokerAdmin for $ptr<T> {
            async fn connect(&self) -> Result<()> {
                (**self).connect().await
            }
            async fn list_topics(&self) -> Result<Vec<String>> {
                (**self).list_topics().await
            }
            async fn create_topics(&self, topics: &[TopicSpec], wait_for_leaders: bool) -> Result<()> {
                (**self).create_topics(topics, wait_for_leaders).await
            }
            async fn disconnect(&self) -> Result<()> {
                (**self).disconnect().await
            }
        }

        #[async_trait]
        impl<T: BrokerProducer + ?Sized> BrokerProducer for $ptr<T> {
            async fn connect(&self) -> Result<()> {
                (**self).connect().await
            }
            async fn send(&self, topic: &str, message: OutboundMessage) -> Result<()> {
                (**self).send(topic, message).await
            }
            async fn disconnect(&self) -> Result<()> {
                (**self).disconnect().await
            }
        }

        #[async_trait]
        impl<T: BrokerConsumer + ?Sized> BrokerConsumer for $ptr<T> {
            async fn connect(&self) -> Result<()> {
                (**self).connect().await
            }
            async fn subscribe(&self, topics: &[String]) -> Result<()> {
                (**self).subscribe(topics).await
            }
            async fn recv(&self) -> Result<BrokerMessage> {
                (**self).recv().await
            }
            async fn disconnect(&self) -> Result<()> {
                (**self).disconnect().await
            }
        }
    )*};
}

forward_pointer_impls!(Box, Arc);
