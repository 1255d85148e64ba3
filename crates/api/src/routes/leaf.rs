//! Collaborator endpoints that answer with what they received.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Map, Value, json};

use super::{InboundCall, now_iso};
use crate::AppState;

fn reply(state: &AppState, endpoint: &str, fields: Value) -> Json<Value> {
    let mut body = Map::new();
    body.insert("service".into(), Value::String(state.service_name.clone()));
    body.insert("endpoint".into(), Value::String(endpoint.into()));
    if let Value::Object(fields) = fields {
        body.extend(fields);
    }
    body.insert("time".into(), Value::String(now_iso()));
    Json(Value::Object(body))
}

pub async fn deduct_product_from_stock(
    State(state): State<Arc<AppState>>,
    call: InboundCall,
) -> Json<Value> {
    reply(&state, "/deduct-product-from-stock", json!({ "deducted": call.body }))
}

pub async fn store_received_product(
    State(state): State<Arc<AppState>>,
    call: InboundCall,
) -> Json<Value> {
    reply(&state, "/store-received-product", json!({ "received": call.body }))
}

pub async fn validate_product_information(
    State(state): State<Arc<AppState>>,
    call: InboundCall,
) -> Json<Value> {
    reply(
        &state,
        "/validate-product-information",
        json!({ "valid": true, "payload": call.body }),
    )
}

pub async fn terms_of_delivery(State(state): State<Arc<AppState>>, _call: InboundCall) -> Json<Value> {
    reply(
        &state,
        "/terms-of-delivery",
        json!({ "terms": ["CONDICION_A", "CONDICION_B"] }),
    )
}

pub async fn assign_vehicle(State(state): State<Arc<AppState>>, call: InboundCall) -> Json<Value> {
    reply(&state, "/assign-vehicle", json!({ "assigned": call.body }))
}

pub async fn generate_alert(State(state): State<Arc<AppState>>, call: InboundCall) -> Json<Value> {
    reply(&state, "/generate-alert", json!({ "alert": call.body }))
}
