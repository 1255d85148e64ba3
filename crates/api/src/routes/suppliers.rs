//! Supplier creation and update.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{NewSupplier, Supplier, SupplierPublished};
use serde::Serialize;

use super::{InboundCall, parse_body, record_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierResponse {
    pub success: bool,
    pub supplier: Supplier,
    pub event_id: String,
}

impl From<SupplierPublished> for SupplierResponse {
    fn from(published: SupplierPublished) -> Self {
        Self {
            success: true,
            supplier: published.supplier,
            event_id: published.event_id.to_string(),
        }
    }
}

/// POST /suppliers — validates the supplier and publishes `SUPPLIER_CREATED`.
///
/// Returns 201 once the event is acknowledged by the broker.
pub async fn create(
    State(state): State<Arc<AppState>>,
    call: InboundCall,
) -> Result<(StatusCode, Json<SupplierResponse>), ApiError> {
    let input: NewSupplier = parse_body("supplier", call.body)?;
    let created = state.suppliers.create_supplier(input).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// PUT /suppliers/{id} — publishes `SUPPLIER_UPDATED` with the new state.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    call: InboundCall,
) -> Result<Json<SupplierResponse>, ApiError> {
    let id = record_id("supplier", &id)?;
    let input: NewSupplier = parse_body("supplier", call.body)?;
    let updated = state.suppliers.update_supplier(id, input).await?;
    Ok(Json(updated.into()))
}
