//! Medicine service publishing medicine lifecycle events.

use std::sync::Arc;

use broker::{EventEnvelope, EventId, EventPublisher};
use common::RecordId;
use tracing::info;

use super::{MEDICINE_CREATED, MEDICINE_UPDATED, Medicine, NewMedicine};
use crate::Result;

/// A medicine and the id of the event announcing it.
#[derive(Debug, Clone)]
pub struct MedicinePublished {
    pub medicine: Medicine,
    pub event_id: EventId,
}

/// Creates and updates medicines. Like suppliers, medicines only live in the
/// events published for them.
#[derive(Clone)]
pub struct MedicineService {
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl MedicineService {
    pub fn new(publisher: Arc<dyn EventPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[tracing::instrument(skip(self, input), fields(topic = %self.topic))]
    pub async fn create_medicine(&self, input: NewMedicine) -> Result<MedicinePublished> {
        let medicine = Medicine::with_id(RecordId::new(), input)?;
        self.announce(MEDICINE_CREATED, medicine).await
    }

    /// Replaces medicine `id` with `input` and publishes `MEDICINE_UPDATED`.
    #[tracing::instrument(skip(self, input), fields(topic = %self.topic))]
    pub async fn update_medicine(
        &self,
        id: RecordId,
        input: NewMedicine,
    ) -> Result<MedicinePublished> {
        let medicine = Medicine::with_id(id, input)?;
        self.announce(MEDICINE_UPDATED, medicine).await
    }

    async fn announce(&self, event_type: &str, medicine: Medicine) -> Result<MedicinePublished> {
        let envelope = EventEnvelope::with_payload(event_type, &medicine)?;
        self.publisher.publish(&self.topic, &envelope).await?;

        metrics::counter!("medicine_events_total", "event_type" => event_type.to_string())
            .increment(1);
        info!(medicine_id = %medicine.id, event_id = %envelope.event_id(), event_type, "Medicine published");

        Ok(MedicinePublished {
            medicine,
            event_id: envelope.event_id().clone(),
        })
    }
}
