use std::collections::HashMap;

use async_trait::async_trait;
use broker::EventId;
use common::RecordId;
use tokio::sync::RwLock;

use super::{PurchasePlan, PurchasePlanUpdate};
use crate::Result;

/// Storage for purchase plans.
#[async_trait]
pub trait PurchasePlanRepository: Send + Sync {
    /// Stores `plan` unless a plan for the same source event (or with the
    /// same id) exists.
    ///
    /// Returns whichever plan is stored afterwards.
    async fn save(&self, plan: PurchasePlan) -> Result<PurchasePlan>;

    /// Applies `update` to the plan with `id`. `None` when there is no such plan.
    async fn update(
        &self,
        id: RecordId,
        update: PurchasePlanUpdate,
    ) -> Result<Option<PurchasePlan>>;

    async fn find_by_id(&self, id: RecordId) -> Result<Option<PurchasePlan>>;

    async fn find_by_source_event(&self, event_id: &EventId) -> Result<Option<PurchasePlan>>;

    /// All plans in insertion order.
    async fn find_all(&self) -> Result<Vec<PurchasePlan>>;
}

#[derive(Default)]
struct PlanState {
    plans: Vec<PurchasePlan>,
    by_id: HashMap<RecordId, usize>,
    by_source_event: HashMap<EventId, usize>,
}

/// In-memory purchase plan repository. Writes are serialized by one lock.
#[derive(Default)]
pub struct InMemoryPurchasePlanRepository {
    state: RwLock<PlanState>,
}

impl InMemoryPurchasePlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.plans.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PurchasePlanRepository for InMemoryPurchasePlanRepository {
    async fn save(&self, plan: PurchasePlan) -> Result<PurchasePlan> {
        let mut state = self.state.write().await;
        let existing = match plan.source_event_id() {
            Some(event_id) => state.by_source_event.get(event_id),
            None => state.by_id.get(&plan.id),
        };
        if let Some(&index) = existing {
            return Ok(state.plans[index].clone());
        }

        let index = state.plans.len();
        state.by_id.insert(plan.id, index);
        if let Some(event_id) = plan.source_event_id() {
            state.by_source_event.insert(event_id.clone(), index);
        }
        state.plans.push(plan.clone());
        Ok(plan)
    }

    async fn update(
        &self,
        id: RecordId,
        update: PurchasePlanUpdate,
    ) -> Result<Option<PurchasePlan>> {
        let mut state = self.state.write().await;
        let Some(&index) = state.by_id.get(&id) else {
            return Ok(None);
        };
        let plan = &mut state.plans[index];
        plan.apply(update)?;
        Ok(Some(plan.clone()))
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<PurchasePlan>> {
        let state = self.state.read().await;
        Ok(state.by_id.get(&id).map(|&i| state.plans[i].clone()))
    }

    async fn find_by_source_event(&self, event_id: &EventId) -> Result<Option<PurchasePlan>> {
        let state = self.state.read().await;
        Ok(state
            .by_source_event
            .get(event_id)
            .map(|&i| state.plans[i].clone()))
    }

    async fn find_all(&self) -> Result<Vec<PurchasePlan>> {
        Ok(self.state.read().await.plans.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purchase_plan::{NewPurchasePlan, PlanStatus};
    use broker::EventEnvelope;
    use serde_json::json;

    fn plan_for(event: &EventEnvelope) -> PurchasePlan {
        PurchasePlan::from_event(event).unwrap()
    }

    #[tokio::test]
    async fn save_and_find() {
        let repo = InMemoryPurchasePlanRepository::new();
        let event = EventEnvelope::new("SUPPLIER_CREATED", json!({"id": "s1"}));
        let plan = repo.save(plan_for(&event)).await.unwrap();

        assert_eq!(repo.find_by_id(plan.id).await.unwrap(), Some(plan.clone()));
        assert_eq!(
            repo.find_by_source_event(event.event_id()).await.unwrap(),
            Some(plan)
        );
        assert_eq!(repo.find_by_id(RecordId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_plan_for_same_event_is_not_stored() {
        let repo = InMemoryPurchasePlanRepository::new();
        let event = EventEnvelope::new("SUPPLIER_CREATED", json!({"id": "s1"}));

        let first = repo.save(plan_for(&event)).await.unwrap();
        let second = repo.save(plan_for(&event)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn find_all_keeps_insertion_order() {
        let repo = InMemoryPurchasePlanRepository::new();
        for id in ["a", "b", "c"] {
            let event = EventEnvelope::new("SUPPLIER_CREATED", json!({"id": id}));
            repo.save(plan_for(&event)).await.unwrap();
        }

        let suppliers: Vec<String> = repo
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.supplier_id)
            .collect();
        assert_eq!(suppliers, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn hand_made_plans_are_all_stored() {
        let repo = InMemoryPurchasePlanRepository::new();
        for _ in 0..2 {
            let plan = PurchasePlan::create(NewPurchasePlan {
                supplier_id: "s1".into(),
                items: vec![json!({"sku": "A"})],
                ..NewPurchasePlan::default()
            })
            .unwrap();
            repo.save(plan).await.unwrap();
        }
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn update_applies_to_stored_plan() {
        let repo = InMemoryPurchasePlanRepository::new();
        let event = EventEnvelope::new("SUPPLIER_CREATED", json!({"id": "s1"}));
        let plan = repo.save(plan_for(&event)).await.unwrap();

        let updated = repo
            .update(
                plan.id,
                PurchasePlanUpdate {
                    status: Some(PlanStatus::Pending),
                    ..PurchasePlanUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, PlanStatus::Pending);
        assert_eq!(repo.find_by_id(plan.id).await.unwrap(), Some(updated.clone()));
        assert_eq!(
            repo.find_by_source_event(event.event_id()).await.unwrap(),
            Some(updated)
        );
    }

    #[tokio::test]
    async fn update_of_unknown_plan_is_none() {
        let repo = InMemoryPurchasePlanRepository::new();
        let result = repo
            .update(RecordId::new(), PurchasePlanUpdate::default())
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn rejected_update_keeps_stored_plan() {
        let repo = InMemoryPurchasePlanRepository::new();
        let event = EventEnvelope::new("SUPPLIER_CREATED", json!({"id": "s1"}));
        let plan = repo.save(plan_for(&event)).await.unwrap();

        let err = repo
            .update(
                plan.id,
                PurchasePlanUpdate {
                    supplier_id: Some(" ".into()),
                    ..PurchasePlanUpdate::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, crate::DomainError::Validation(_)));
        assert_eq!(repo.find_by_id(plan.id).await.unwrap(), Some(plan));
    }
}
