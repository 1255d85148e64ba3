//! HTTP surface for the choreography services.
//!
//! Chain endpoints fan a request out to collaborator services, leaf endpoints
//! answer those calls, and the domain endpoints publish supplier and medicine
//! events and manage the purchase plans and sales derived from them. Every request gets an
//! `x-request-id`, logged by the trace layer and echoed on the response.

pub mod audit;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Request};
use axum::routing::{any, get, post, put};
use chain::ChainOrchestrator;
use consumer::EventHandler;
use domain::{MedicineService, PurchasePlanRepository, SaleRepository, SupplierService};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;

use audit::AuditSink;

/// Shared state handed to every route.
pub struct AppState {
    pub service_name: String,
    pub orchestrator: ChainOrchestrator,
    pub suppliers: SupplierService,
    pub medicines: MedicineService,
    pub purchase_plans: Arc<dyn PurchasePlanRepository>,
    pub sales: Arc<dyn SaleRepository>,
    /// Receives CloudEvents pushed to `/events`.
    pub event_handler: Arc<dyn EventHandler>,
    pub audit: Arc<dyn AuditSink>,
}

/// Fills in `x-request-id` for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeChainRequestId;

impl MakeRequestId for MakeChainRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(common::RequestId::generate().as_str())
            .ok()
            .map(RequestId::new)
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/ready", get(routes::health::ready))
        // Chains
        .route("/register-sale", any(routes::chains::register_sale))
        .route("/register-lot", any(routes::chains::register_lot))
        .route("/plan-delivery-route", any(routes::chains::plan_delivery_route))
        .route(
            "/track-cold-chain-traceability",
            any(routes::chains::track_cold_chain),
        )
        // Collaborator endpoints
        .route(
            "/deduct-product-from-stock",
            any(routes::leaf::deduct_product_from_stock),
        )
        .route(
            "/store-received-product",
            any(routes::leaf::store_received_product),
        )
        .route(
            "/validate-product-information",
            any(routes::leaf::validate_product_information),
        )
        .route("/terms-of-delivery", any(routes::leaf::terms_of_delivery))
        .route("/assign-vehicle", any(routes::leaf::assign_vehicle))
        .route("/generate-alert", any(routes::leaf::generate_alert))
        // Events and domain records
        .route("/events", post(routes::events::receive))
        .route("/suppliers", post(routes::suppliers::create))
        .route("/suppliers/{id}", put(routes::suppliers::update))
        .route("/medicines", post(routes::medicines::create))
        .route("/medicines/{id}", put(routes::medicines::update))
        .route(
            "/purchase-plans",
            get(routes::purchase_plans::list).post(routes::purchase_plans::create),
        )
        .route(
            "/purchase-plans/{id}",
            get(routes::purchase_plans::get).put(routes::purchase_plans::update),
        )
        .route("/sales", get(routes::sales::list))
        .with_state(state)
        .merge(metrics_router)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeChainRequestId))
}
