use std::sync::Arc;

use async_trait::async_trait;
use broker::EventEnvelope;
use consumer::{EventHandler, HandlerError};
use tracing::info;

use super::{PurchasePlan, PurchasePlanRepository};
use crate::Result;

/// Turns supplier events into purchase plans.
///
/// Redelivered events are recognized by event id and resolve to the plan
/// already stored for them.
#[derive(Clone)]
pub struct PurchasePlanHandler {
    repository: Arc<dyn PurchasePlanRepository>,
}

impl PurchasePlanHandler {
    pub fn new(repository: Arc<dyn PurchasePlanRepository>) -> Self {
        Self { repository }
    }

    /// Derives and stores the plan for `event`, or returns the one already
    /// stored for it.
    #[tracing::instrument(
        skip(self, event),
        fields(event_id = %event.event_id(), event_type = event.event_type())
    )]
    pub async fn process(&self, event: &EventEnvelope) -> Result<PurchasePlan> {
        if let Some(existing) = self.repository.find_by_source_event(event.event_id()).await? {
            info!(plan_id = %existing.id, "Duplicate delivery, plan already exists");
            metrics::counter!("purchase_plans_duplicates_total").increment(1);
            return Ok(existing);
        }

        let plan = PurchasePlan::from_event(event)?;
        let stored = self.repository.save(plan).await?;
        metrics::counter!("purchase_plans_created_total").increment(1);
        info!(plan_id = %stored.id, supplier_id = %stored.supplier_id, "Purchase plan stored");
        Ok(stored)
    }
}

#[async_trait]
impl EventHandler for PurchasePlanHandler {
    fn name(&self) -> &'static str {
        "PurchasePlanHandler"
    }

    async fn handle(&self, _topic: &str, event: &EventEnvelope) -> std::result::Result<(), HandlerError> {
        self.process(event).await?;
        Ok(())
    }
}
