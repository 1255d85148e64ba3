//! Chain endpoints: each fans one request out to collaborator services.
//!
//! Every step is attempted even when an earlier one failed. The response
//! carries one result per step, in order, and is a 502 only when no step
//! succeeded.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chain::{CallSpec, ChainOrchestrator, ChainReport, HttpCollaborator};
use domain::Sale;
use serde_json::{Map, Value, json};
use tracing::warn;

use super::{InboundCall, now_iso};
use crate::AppState;
use crate::audit::{AuditEntry, spawn_record};
use crate::config::CollaboratorUrls;

pub const CENTRO: &str = "centro";
pub const RUTA: &str = "ruta";
pub const NORMATIVA: &str = "normativa";
pub const VEHICULO: &str = "vehiculo";
pub const ALERTA: &str = "alerta";

const DEFAULT_LOT: &str = "L-123";
const DEFAULT_ROUTE: &str = "R-001";

/// Registers an HTTP collaborator for every configured service URL.
pub fn build_orchestrator(
    urls: &CollaboratorUrls,
    timeout: Duration,
    client: reqwest::Client,
) -> ChainOrchestrator {
    let http = |name: &str, url: &str| HttpCollaborator::new(name, url, client.clone(), timeout);
    ChainOrchestrator::new(timeout)
        .with(http(CENTRO, &urls.centro))
        .with(http(RUTA, &urls.ruta))
        .with(http(NORMATIVA, &urls.normativa))
        .with(http(VEHICULO, &urls.vehiculo))
        .with(http(ALERTA, &urls.alerta))
}

/// Builds the response for a finished chain and audits it.
fn respond(
    state: &AppState,
    call: &InboundCall,
    endpoint: &'static str,
    report: ChainReport,
    extra: Map<String, Value>,
) -> Response {
    let status = if report.all_failed() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    let mut body = Map::new();
    body.insert("service".into(), Value::String(state.service_name.clone()));
    body.insert("endpoint".into(), Value::String(endpoint.into()));
    body.insert("chain".into(), json!(report.results));
    body.insert("requestId".into(), Value::String(report.request_id.clone()));
    body.extend(extra);
    body.insert("time".into(), Value::String(now_iso()));
    let body = Value::Object(body);

    let trace = chain::TraceContext::from_headers(&call.headers);
    spawn_record(
        &state.audit,
        AuditEntry::new(
            &state.service_name,
            endpoint,
            call.method.as_str(),
            &trace,
            call.audit_request(),
            body.clone(),
        ),
    );

    (status, Json(body)).into_response()
}

/// Deducts stock, plans the delivery route, then records the sale.
///
/// A failed sale insert is reported as `pgStored: false`; it never fails the
/// request.
#[tracing::instrument(skip_all, fields(endpoint = "/register-sale"))]
pub async fn register_sale(State(state): State<Arc<AppState>>, call: InboundCall) -> Response {
    let sku = call.body_str("sku").unwrap_or(Sale::DEFAULT_SKU).to_string();
    let amount = call
        .body
        .get("amount")
        .and_then(Value::as_i64)
        .and_then(|a| i32::try_from(a).ok())
        .unwrap_or(Sale::DEFAULT_AMOUNT);
    let sale = Sale::new(sku.clone(), amount);

    let steps = vec![
        CallSpec::post(CENTRO, "/deduct-product-from-stock").payload({
            let sku = sku.clone();
            move |_| json!({ "sku": sku, "amount": amount })
        }),
        CallSpec::post(RUTA, "/plan-delivery-route").payload({
            let sale_id = sale.id.clone();
            move |_| json!({ "saleId": sale_id, "sku": sku })
        }),
    ];
    let report = state.orchestrator.run_chain(&call.inbound(), &steps).await;

    let pg_stored = match state.sales.save(&sale).await {
        Ok(_) => true,
        Err(e) => {
            warn!(sale_id = %sale.id, error = %e, "Failed to store sale");
            false
        }
    };

    let mut extra = Map::new();
    extra.insert("saleId".into(), Value::String(sale.id));
    extra.insert("pgStored".into(), Value::Bool(pg_stored));
    respond(&state, &call, "/register-sale", report, extra)
}

/// Validates the lot's product information, then stores the received product.
#[tracing::instrument(skip_all, fields(endpoint = "/register-lot"))]
pub async fn register_lot(State(state): State<Arc<AppState>>, call: InboundCall) -> Response {
    let lot = call.body_str("lot").unwrap_or(DEFAULT_LOT).to_string();

    let steps = vec![
        CallSpec::post(NORMATIVA, "/validate-product-information").payload({
            let lot = lot.clone();
            move |_| json!({ "lot": lot })
        }),
        CallSpec::post(CENTRO, "/store-received-product").payload({
            let lot = lot.clone();
            move |_| json!({ "lot": lot })
        }),
    ];
    let report = state.orchestrator.run_chain(&call.inbound(), &steps).await;

    let mut extra = Map::new();
    extra.insert("lot".into(), Value::String(lot));
    respond(&state, &call, "/register-lot", report, extra)
}

/// Fetches delivery terms for the route, then assigns a vehicle.
#[tracing::instrument(skip_all, fields(endpoint = "/plan-delivery-route"))]
pub async fn plan_delivery_route(
    State(state): State<Arc<AppState>>,
    call: InboundCall,
) -> Response {
    let route_id = call.body_str("routeId").unwrap_or(DEFAULT_ROUTE).to_string();

    let steps = vec![
        CallSpec::get(NORMATIVA, "/terms-of-delivery").query("routeId", route_id.clone()),
        CallSpec::post(VEHICULO, "/assign-vehicle").payload({
            let route_id = route_id.clone();
            move |_| json!({ "routeId": route_id })
        }),
    ];
    let report = state.orchestrator.run_chain(&call.inbound(), &steps).await;

    respond(&state, &call, "/plan-delivery-route", report, Map::new())
}

/// Raises a cold-chain alert for the SKU.
#[tracing::instrument(skip_all, fields(endpoint = "/track-cold-chain-traceability"))]
pub async fn track_cold_chain(State(state): State<Arc<AppState>>, call: InboundCall) -> Response {
    let sku = call.body_str("sku").unwrap_or(Sale::DEFAULT_SKU).to_string();

    let steps = vec![CallSpec::post(ALERTA, "/generate-alert").payload(move |_| {
        json!({ "type": "COLD_CHAIN", "sku": sku })
    })];
    let report = state.orchestrator.run_chain(&call.inbound(), &steps).await;

    respond(
        &state,
        &call,
        "/track-cold-chain-traceability",
        report,
        Map::new(),
    )
}
