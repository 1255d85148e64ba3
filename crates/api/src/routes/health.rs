//! Health and readiness endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::now_iso;
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub time: String,
}

/// GET /health — liveness; never touches dependencies.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service_name.clone(),
        time: now_iso(),
    })
}

/// GET /ready — succeeds only when the sales store answers.
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    state.sales.list(1).await?;
    Ok(Json(HealthResponse {
        status: "ready",
        service: state.service_name.clone(),
        time: now_iso(),
    }))
}
