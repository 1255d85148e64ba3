//! Purchase plans: derived from supplier events, or created and edited by hand.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{NewPurchasePlan, PurchasePlan, PurchasePlanUpdate};
use serde::Serialize;

use super::{InboundCall, parse_body, record_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub success: bool,
    pub purchase_plan: PurchasePlan,
}

impl From<PurchasePlan> for PlanResponse {
    fn from(purchase_plan: PurchasePlan) -> Self {
        Self {
            success: true,
            purchase_plan,
        }
    }
}

/// GET /purchase-plans
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListResponse<PurchasePlan>>, ApiError> {
    let plans = state.purchase_plans.find_all().await?;
    Ok(Json(plans.into()))
}

/// GET /purchase-plans/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PurchasePlan>, ApiError> {
    let plan_id = record_id("purchase plan", &id)?;

    state
        .purchase_plans
        .find_by_id(plan_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Purchase plan {id} not found")))
}

/// POST /purchase-plans — stores a `pending` plan. Needs a supplier id and
/// at least one item.
pub async fn create(
    State(state): State<Arc<AppState>>,
    call: InboundCall,
) -> Result<(StatusCode, Json<PlanResponse>), ApiError> {
    let input: NewPurchasePlan = parse_body("purchase plan", call.body)?;
    let plan = PurchasePlan::create(input)?;
    let stored = state.purchase_plans.save(plan).await?;
    tracing::info!(plan_id = %stored.id, "Purchase plan created");
    Ok((StatusCode::CREATED, Json(stored.into())))
}

/// PUT /purchase-plans/{id} — changes the given fields of a stored plan.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    call: InboundCall,
) -> Result<Json<PlanResponse>, ApiError> {
    let plan_id = record_id("purchase plan", &id)?;
    let update: PurchasePlanUpdate = parse_body("purchase plan", call.body)?;

    state
        .purchase_plans
        .update(plan_id, update)
        .await?
        .map(|plan| Json(plan.into()))
        .ok_or_else(|| ApiError::NotFound(format!("Purchase plan {id} not found")))
}
