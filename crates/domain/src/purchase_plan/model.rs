use broker::{EventEnvelope, EventId};
use chrono::{DateTime, Utc};
use common::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    CreatedFromEvent,
}

/// Where a plan came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSource {
    pub source_event: String,
    pub source_event_id: EventId,
    pub source_timestamp: String,
    pub supplier_data: Value,
}

/// Input for creating a plan by hand.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewPurchasePlan {
    pub supplier_id: String,
    pub items: Vec<Value>,
    pub total_amount: Option<f64>,
    pub status: Option<PlanStatus>,
}

/// Fields a plan update may change. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchasePlanUpdate {
    pub supplier_id: Option<String>,
    pub items: Option<Vec<Value>>,
    pub total_amount: Option<f64>,
    pub status: Option<PlanStatus>,
}

/// A purchase plan, either derived from a supplier event or created by hand.
///
/// `metadata` records the source event and is `null` for hand-made plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePlan {
    pub id: RecordId,
    pub supplier_id: String,
    pub items: Vec<Value>,
    pub total_amount: f64,
    pub status: PlanStatus,
    pub metadata: Option<PlanSource>,
    pub created_at: DateTime<Utc>,
}

impl PurchasePlan {
    /// Derives a plan from a supplier event.
    ///
    /// The plan gets its own id, never the event id. Supplier data must be a
    /// JSON object; `id`, `items` and `totalAmount` are read from it when
    /// present and well-typed.
    pub fn from_event(event: &EventEnvelope) -> Result<Self> {
        let data = event.data();
        let Some(fields) = data.as_object() else {
            return Err(DomainError::validation(format!(
                "Event {} carries no supplier object",
                event.event_id()
            )));
        };

        let supplier_id = match fields.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => RecordId::new().to_string(),
        };
        let items = fields
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total_amount = fields
            .get("totalAmount")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        Ok(Self {
            id: RecordId::new(),
            supplier_id,
            items,
            total_amount,
            status: PlanStatus::CreatedFromEvent,
            metadata: Some(PlanSource {
                source_event: event.event_type().to_string(),
                source_event_id: event.event_id().clone(),
                source_timestamp: event.timestamp_iso(),
                supplier_data: data.clone(),
            }),
            created_at: Utc::now(),
        })
    }

    /// Builds a hand-made plan, `pending` unless a status is given.
    pub fn create(input: NewPurchasePlan) -> Result<Self> {
        let plan = Self {
            id: RecordId::new(),
            supplier_id: input.supplier_id.trim().to_string(),
            items: input.items,
            total_amount: input.total_amount.unwrap_or(0.0),
            status: input.status.unwrap_or(PlanStatus::Pending),
            metadata: None,
            created_at: Utc::now(),
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Applies `update`. A given supplier id must be non-blank and a given
    /// item list non-empty; on error the plan is unchanged.
    pub fn apply(&mut self, update: PurchasePlanUpdate) -> Result<()> {
        let supplier_id = update.supplier_id.map(|id| id.trim().to_string());
        if supplier_id.as_deref().is_some_and(str::is_empty) {
            return Err(DomainError::validation("Supplier ID is required"));
        }
        if update.items.as_ref().is_some_and(Vec::is_empty) {
            return Err(DomainError::validation("At least one item is required"));
        }

        if let Some(supplier_id) = supplier_id {
            self.supplier_id = supplier_id;
        }
        if let Some(items) = update.items {
            self.items = items;
        }
        if let Some(total_amount) = update.total_amount {
            self.total_amount = total_amount;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.supplier_id.is_empty() {
            return Err(DomainError::validation("Supplier ID is required"));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("At least one item is required"));
        }
        Ok(())
    }

    pub fn source(&self) -> Option<&PlanSource> {
        self.metadata.as_ref()
    }

    /// Id of the event this plan was derived from, if any.
    pub fn source_event_id(&self) -> Option<&EventId> {
        self.source().map(|source| &source.source_event_id)
    }
}
