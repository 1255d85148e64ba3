//! Supplier service publishing supplier lifecycle events.

use std::sync::Arc;

use broker::{EventEnvelope, EventId, EventPublisher};
use common::RecordId;
use tracing::info;

use super::{NewSupplier, SUPPLIER_CREATED, SUPPLIER_UPDATED, Supplier};
use crate::Result;

/// A supplier and the id of the event announcing it.
#[derive(Debug, Clone)]
pub struct SupplierPublished {
    pub supplier: Supplier,
    pub event_id: EventId,
}

/// Creates and updates suppliers, announcing them on the supplier topic.
///
/// Suppliers are not stored here; downstream services learn about them from
/// the published event.
#[derive(Clone)]
pub struct SupplierService {
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl SupplierService {
    pub fn new(publisher: Arc<dyn EventPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Validates the input, then publishes `SUPPLIER_CREATED`.
    ///
    /// Fails with `Validation` before anything is published, or with
    /// `Publish` when the broker rejects the event.
    #[tracing::instrument(skip(self, input), fields(topic = %self.topic))]
    pub async fn create_supplier(&self, input: NewSupplier) -> Result<SupplierPublished> {
        let supplier = Supplier::create(input)?;
        let published = self.announce(SUPPLIER_CREATED, supplier).await?;

        metrics::counter!("suppliers_created_total").increment(1);
        info!(supplier_id = %published.supplier.id, event_id = %published.event_id, "Supplier created");
        Ok(published)
    }

    /// Replaces supplier `id` with `input` and publishes `SUPPLIER_UPDATED`
    /// carrying the full new state. Same failure modes as creation.
    #[tracing::instrument(skip(self, input), fields(topic = %self.topic))]
    pub async fn update_supplier(
        &self,
        id: RecordId,
        input: NewSupplier,
    ) -> Result<SupplierPublished> {
        let supplier = Supplier::with_id(id, input)?;
        let published = self.announce(SUPPLIER_UPDATED, supplier).await?;

        metrics::counter!("suppliers_updated_total").increment(1);
        info!(supplier_id = %id, event_id = %published.event_id, "Supplier updated");
        Ok(published)
    }

    async fn announce(&self, event_type: &str, supplier: Supplier) -> Result<SupplierPublished> {
        let envelope = EventEnvelope::with_payload(event_type, &supplier)?;
        self.publisher.publish(&self.topic, &envelope).await?;
        Ok(SupplierPublished {
            supplier,
            event_id: envelope.event_id().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::{InMemoryBroker, Publisher, TopicSpec, decode_message};

    use crate::DomainError;
    use crate::supplier::SUPPLIER_EVENTS_TOPIC;

    async fn service(broker: &InMemoryBroker) -> SupplierService {
        broker
            .create_topic(TopicSpec::new(SUPPLIER_EVENTS_TOPIC, 1, 1).unwrap())
            .await
            .unwrap();
        SupplierService::new(
            Arc::new(Publisher::new(broker.producer())),
            SUPPLIER_EVENTS_TOPIC,
        )
    }

    #[tokio::test]
    async fn publishes_supplier_created() {
        let broker = InMemoryBroker::new();
        let service = service(&broker).await;

        let created = service
            .create_supplier(NewSupplier::named("Acme"))
            .await
            .unwrap();

        let messages = broker.messages(SUPPLIER_EVENTS_TOPIC).await;
        assert_eq!(messages.len(), 1);

        let envelope = decode_message(&messages[0]).unwrap();
        assert_eq!(envelope.event_type(), SUPPLIER_CREATED);
        assert_eq!(envelope.event_id(), &created.event_id);
        assert_eq!(envelope.data()["name"], "Acme");
        assert_eq!(envelope.data()["id"], created.supplier.id.to_string());
    }

    #[tokio::test]
    async fn invalid_supplier_publishes_nothing() {
        let broker = InMemoryBroker::new();
        let service = service(&broker).await;

        let err = service
            .create_supplier(NewSupplier::named(" "))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert!(broker.messages(SUPPLIER_EVENTS_TOPIC).await.is_empty());
    }

    #[tokio::test]
    async fn broker_outage_is_publish_error() {
        let broker = InMemoryBroker::new();
        let service = service(&broker).await;
        broker.set_unavailable(true);

        let err = service
            .create_supplier(NewSupplier::named("Acme"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Publish(_)));
    }

    #[tokio::test]
    async fn update_publishes_supplier_updated_for_same_id() {
        let broker = InMemoryBroker::new();
        let service = service(&broker).await;
        let id = RecordId::new();

        let updated = service
            .update_supplier(id, NewSupplier::named("Acme Renamed"))
            .await
            .unwrap();

        assert_eq!(updated.supplier.id, id);
        let messages = broker.messages(SUPPLIER_EVENTS_TOPIC).await;
        let envelope = decode_message(&messages[0]).unwrap();
        assert_eq!(envelope.event_type(), SUPPLIER_UPDATED);
        assert_eq!(envelope.event_id(), &updated.event_id);
        assert_eq!(envelope.data()["id"], id.to_string());
        assert_eq!(envelope.data()["name"], "Acme Renamed");
    }

    #[tokio::test]
    async fn invalid_update_publishes_nothing() {
        let broker = InMemoryBroker::new();
        let service = service(&broker).await;

        let err = service
            .update_supplier(RecordId::new(), NewSupplier::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert!(broker.messages(SUPPLIER_EVENTS_TOPIC).await.is_empty());
    }
}
