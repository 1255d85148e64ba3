//! Medicine creation and update.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Medicine, MedicinePublished, NewMedicine};
use serde::Serialize;

use super::{InboundCall, parse_body, record_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineResponse {
    pub success: bool,
    pub medicine: Medicine,
    pub event_id: String,
}

impl From<MedicinePublished> for MedicineResponse {
    fn from(published: MedicinePublished) -> Self {
        Self {
            success: true,
            medicine: published.medicine,
            event_id: published.event_id.to_string(),
        }
    }
}

/// POST /medicines — publishes `MEDICINE_CREATED`.
pub async fn create(
    State(state): State<Arc<AppState>>,
    call: InboundCall,
) -> Result<(StatusCode, Json<MedicineResponse>), ApiError> {
    let input: NewMedicine = parse_body("medicine", call.body)?;
    let created = state.medicines.create_medicine(input).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// PUT /medicines/{id} — publishes `MEDICINE_UPDATED`.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    call: InboundCall,
) -> Result<Json<MedicineResponse>, ApiError> {
    let id = record_id("medicine", &id)?;
    let input: NewMedicine = parse_body("medicine", call.body)?;
    let updated = state.medicines.update_medicine(id, input).await?;
    Ok(Json(updated.into()))
}
