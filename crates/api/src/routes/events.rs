//! CloudEvent ingress.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use broker::cloudevent::normalize;
use chain::TraceContext;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::now_iso;
use crate::AppState;
use crate::audit::{AuditEntry, AuditRequest, spawn_record};
use crate::error::ApiError;

/// Topic name reported to handlers for events pushed over HTTP.
pub const CLOUDEVENTS_TOPIC: &str = "cloudevents";

/// POST /events — accepts a binary-mode CloudEvent and hands the normalized
/// envelope to the event handler.
///
/// Malformed events are rejected with 400 before any handler runs. Handler
/// failures are reported as `handled: false`, not as an error status.
#[tracing::instrument(skip_all, fields(endpoint = "/events"))]
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let (event, envelope) = normalize(&headers, &body)?;
    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        source = %event.source,
        subject = event.subject.as_deref().unwrap_or("N/A"),
        "CloudEvent received"
    );

    let handled = match state
        .event_handler
        .handle(CLOUDEVENTS_TOPIC, &envelope)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "CloudEvent handler failed");
            false
        }
    };

    let response = json!({
        "message": "CloudEvent received and logged successfully",
        "eventId": event.id,
        "eventType": event.event_type,
        "service": state.service_name,
        "handled": handled,
        "time": now_iso(),
    });

    spawn_record(
        &state.audit,
        AuditEntry::new(
            &state.service_name,
            "/events",
            "POST",
            &TraceContext::from_headers(&headers),
            AuditRequest {
                path: "/events".into(),
                query: json!({}),
                body: envelope.data().clone(),
            },
            json!({ "cloudEvent": event }),
        ),
    );

    Ok(Json(response))
}
