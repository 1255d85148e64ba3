use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{BrokerError, BrokerProducer, EventEnvelope, OutboundMessage, Result};

/// Port through which domain services emit events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one envelope to `topic`. Failures are returned, never swallowed.
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
    Closed,
}

/// Publishes envelopes through a [`BrokerProducer`].
///
/// Connects on first use. Messages are keyed by event id and carry the
/// `event-type`/`timestamp` headers. Any broker failure while publishing,
/// including the lazy connect, is reported as `BrokerError::Publish`; only a
/// closed publisher reports `Closed`.
pub struct Publisher<P> {
    producer: P,
    state: Mutex<ConnectionState>,
}

impl<P: BrokerProducer> Publisher<P> {
    pub fn new(producer: P) -> Self {
        Self {
            producer,
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Connects eagerly. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(BrokerError::Closed),
            ConnectionState::Disconnected => {
                self.producer.connect().await?;
                *state = ConnectionState::Connected;
                info!("Publisher connected");
                Ok(())
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.lock().await == ConnectionState::Connected
    }

    /// Releases the producer. Safe to call any number of times; publishing
    /// after close fails with `Closed`.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ConnectionState::Closed);
        if previous == ConnectionState::Connected {
            if let Err(e) = self.producer.disconnect().await {
                warn!(error = %e, "Producer disconnect failed");
                return Err(e);
            }
            info!("Publisher closed");
        } else {
            debug!(?previous, "Publisher close with no open connection");
        }
        Ok(())
    }
}

#[async_trait]
impl<P: BrokerProducer> EventPublisher for Publisher<P> {
    #[instrument(
        skip(self, envelope),
        fields(event_id = %envelope.event_id(), event_type = envelope.event_type())
    )]
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<()> {
        match self.connect().await {
            Ok(()) => {}
            Err(BrokerError::Closed) => return Err(BrokerError::Closed),
            Err(e) => return Err(publish_failed(topic, e)),
        }
        let message = OutboundMessage::from_envelope(envelope)?;

        match self.producer.send(topic, message).await {
            Ok(()) => {
                metrics::counter!("broker_events_published_total", "topic" => topic.to_string())
                    .increment(1);
                info!("Event published");
                Ok(())
            }
            Err(e) => Err(publish_failed(topic, e)),
        }
    }
}

fn publish_failed(topic: &str, e: BrokerError) -> BrokerError {
    metrics::counter!("broker_publish_failures_total", "topic" => topic.to_string()).increment(1);
    error!(error = %e, "Failed to publish event");
    match e {
        publish @ BrokerError::Publish { .. } => publish,
        other => BrokerError::Publish {
            topic: topic.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrokerConsumer, InMemoryBroker, TopicSpec, decode_message};
    use serde_json::json;

    async fn setup() -> (InMemoryBroker, Publisher<crate::InMemoryProducer>) {
        let broker = InMemoryBroker::new();
        broker
            .create_topic(TopicSpec::new("supplier-events", 1, 1).unwrap())
            .await
            .unwrap();
        let publisher = Publisher::new(broker.producer());
        (broker, publisher)
    }

    #[tokio::test]
    async fn publishes_envelope_keyed_by_event_id() {
        let (broker, publisher) = setup().await;
        let envelope = EventEnvelope::new("SUPPLIER_CREATED", json!({"name": "ACME"}));

        publisher.publish("supplier-events", &envelope).await.unwrap();

        let messages = broker.messages("supplier-events").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key.as_deref(), Some(envelope.event_id().as_str()));
        assert_eq!(messages[0].header("event-type"), Some("SUPPLIER_CREATED"));
        assert_eq!(decode_message(&messages[0]).unwrap(), envelope);
    }

    #[tokio::test]
    async fn connects_lazily() {
        let (_broker, publisher) = setup().await;
        assert!(!publisher.is_connected().await);

        publisher
            .publish("supplier-events", &EventEnvelope::new("T", json!({})))
            .await
            .unwrap();
        assert!(publisher.is_connected().await);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_publish_error() {
        let (broker, publisher) = setup().await;
        broker.fail_next_publishes(1);

        let result = publisher
            .publish("supplier-events", &EventEnvelope::new("T", json!({})))
            .await;
        assert!(matches!(result, Err(BrokerError::Publish { ref topic, .. }) if topic == "supplier-events"));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_publish() {
        let (broker, publisher) = setup().await;
        broker.set_unavailable(true);

        let result = publisher
            .publish("supplier-events", &EventEnvelope::new("T", json!({})))
            .await;
        assert!(matches!(
            result,
            Err(BrokerError::Publish { ref topic, ref reason })
                if topic == "supplier-events" && reason.contains("unavailable")
        ));
        assert!(!publisher.is_connected().await);

        broker.set_unavailable(false);
        publisher
            .publish("supplier-events", &EventEnvelope::new("T", json!({})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn eager_connect_still_reports_unavailable() {
        let (broker, publisher) = setup().await;
        broker.set_unavailable(true);
        assert!(matches!(publisher.connect().await, Err(BrokerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (_broker, publisher) = setup().await;
        publisher.connect().await.unwrap();

        publisher.close().await.unwrap();
        publisher.close().await.unwrap();
        assert!(!publisher.is_connected().await);

        let result = publisher
            .publish("supplier-events", &EventEnvelope::new("T", json!({})))
            .await;
        assert!(matches!(result, Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn close_without_connect_is_fine() {
        let (_broker, publisher) = setup().await;
        publisher.close().await.unwrap();
    }

    #[tokio::test]
    async fn published_event_reaches_consumer() {
        let (broker, publisher) = setup().await;
        let consumer = broker.consumer("g", false);
        consumer.connect().await.unwrap();
        consumer
            .subscribe(&["supplier-events".to_string()])
            .await
            .unwrap();

        let envelope = EventEnvelope::new("SUPPLIER_CREATED", json!({"id": "s-1"}));
        publisher.publish("supplier-events", &envelope).await.unwrap();

        let received = decode_message(&consumer.recv().await.unwrap()).unwrap();
        assert_eq!(received.event_id(), envelope.event_id());
    }
}
