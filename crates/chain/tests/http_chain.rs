//! Chains against real HTTP collaborators served by a local axum server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{any, post},
};
use broker::EventEnvelope;
use chain::{
    CallSpec, ChainOrchestrator, EventMeshForwarder, HttpCollaborator, InboundRequest,
};
use consumer::EventHandler;
use serde_json::{Value, json};

type Seen = Arc<Mutex<Vec<HeaderMap>>>;

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn deduct(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(headers);
    Json(json!({ "deducted": body }))
}

async fn plan(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(headers);
    Json(json!({ "planned": body }))
}

async fn broken() -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({}))
}

async fn collaborators() -> (SocketAddr, Seen) {
    let seen: Seen = Arc::default();
    let router = Router::new()
        .route("/deduct-product-from-stock", post(deduct))
        .route("/plan-delivery-route", post(plan))
        .route("/broken", any(broken))
        .route("/slow", any(slow))
        .with_state(seen.clone());
    (serve(router).await, seen)
}

fn orchestrator(addr: SocketAddr, timeout: Duration) -> ChainOrchestrator {
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");
    ChainOrchestrator::new(timeout)
        .with(HttpCollaborator::new("centro", &base, client.clone(), timeout))
        .with(HttpCollaborator::new("ruta", &base, client, timeout))
}

fn sale_steps() -> Vec<CallSpec> {
    vec![
        CallSpec::post("centro", "/deduct-product-from-stock")
            .payload(|body| json!({ "sku": body["sku"], "amount": body["amount"] })),
        CallSpec::post("ruta", "/plan-delivery-route")
            .payload(|body| json!({ "sku": body["sku"] })),
    ]
}

#[tokio::test]
async fn sale_chain_succeeds_and_propagates_trace() {
    let (addr, seen) = collaborators().await;
    let orchestrator = orchestrator(addr, Duration::from_secs(2));

    let mut headers = HeaderMap::new();
    headers.insert("x-request-id", HeaderValue::from_static("abc"));
    headers.insert("x-b3-traceid", HeaderValue::from_static("trace-1"));
    headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
    let request = InboundRequest::new(headers, json!({ "sku": "SKU-1", "amount": 2 }));

    let report = orchestrator.run_chain(&request, &sale_steps()).await;

    assert_eq!(report.request_id, "abc");
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.ok));
    assert_eq!(report.results[0].status, Some(200));
    assert_eq!(
        report.results[0].data,
        Some(json!({ "deducted": { "sku": "SKU-1", "amount": 2 } }))
    );
    assert_eq!(
        report.results[1].url,
        format!("http://{addr}/plan-delivery-route")
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for headers in seen.iter() {
        assert_eq!(headers["x-request-id"], "abc");
        assert_eq!(headers["x-b3-traceid"], "trace-1");
        assert!(headers.get("authorization").is_none());
    }
}

#[tokio::test]
async fn synthesized_request_id_is_shared_by_all_steps() {
    let (addr, seen) = collaborators().await;
    let orchestrator = orchestrator(addr, Duration::from_secs(2));

    let report = orchestrator
        .run_chain(&InboundRequest::default(), &sale_steps())
        .await;

    let seen = seen.lock().unwrap();
    assert!(!report.request_id.is_empty());
    assert_eq!(seen[0]["x-request-id"], report.request_id.as_str());
    assert_eq!(seen[1]["x-request-id"], report.request_id.as_str());
}

#[tokio::test]
async fn error_status_is_an_answer_and_timeout_is_a_failure() {
    let (addr, _seen) = collaborators().await;
    let orchestrator = orchestrator(addr, Duration::from_millis(150));

    let steps = vec![
        CallSpec::get("centro", "/broken"),
        CallSpec::get("ruta", "/slow"),
        CallSpec::post("centro", "/deduct-product-from-stock").payload(|_| json!({})),
    ];
    let report = orchestrator
        .run_chain(&InboundRequest::default(), &steps)
        .await;

    assert_eq!(report.results.len(), 3);

    let broken = &report.results[0];
    assert!(broken.ok);
    assert_eq!(broken.status, Some(500));
    assert_eq!(broken.data, Some(json!({ "error": "boom" })));
    assert!(broken.error.is_none());

    let slow = &report.results[1];
    assert!(!slow.ok);
    assert_eq!(slow.error.as_deref(), Some("Call timed out after 150ms"));

    assert!(report.results[2].ok);
    assert_eq!(report.failures(), 1);
    assert!(!report.all_failed());
}

#[tokio::test]
async fn unreachable_collaborator_is_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let orchestrator = orchestrator(addr, Duration::from_secs(1));
    let report = orchestrator
        .run_chain(&InboundRequest::default(), &sale_steps())
        .await;

    assert!(report.all_failed());
    for result in &report.results {
        assert!(result.status.is_none());
        assert!(result.error.as_deref().unwrap().starts_with("Transport error"));
    }
}

#[tokio::test]
async fn forwarder_posts_binary_cloudevent() {
    let captured: Arc<Mutex<Vec<(HeaderMap, Value)>>> = Arc::default();
    let sink = captured.clone();
    let router = Router::new().route(
        "/",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push((headers, body));
                StatusCode::ACCEPTED
            }
        }),
    );
    let addr = serve(router).await;

    let forwarder = EventMeshForwarder::new(
        reqwest::Client::new(),
        format!("http://{addr}/"),
        "choreo-ms/worker",
        Duration::from_secs(1),
    );
    let envelope = EventEnvelope::new("SUPPLIER_CREATED", json!({ "name": "Acme" }));

    assert_eq!(forwarder.forward(&envelope).await.unwrap(), 202);

    let captured = captured.lock().unwrap();
    let (headers, body) = &captured[0];
    assert_eq!(headers["ce-id"], envelope.event_id().as_str());
    assert_eq!(headers["ce-type"], "SUPPLIER_CREATED");
    assert_eq!(headers["ce-source"], "choreo-ms/worker");
    assert_eq!(headers["ce-specversion"], "1.0");
    assert_eq!(body, &json!({ "name": "Acme" }));
}

#[tokio::test]
async fn forwarder_as_handler_swallows_failures() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let forwarder = EventMeshForwarder::new(
        reqwest::Client::new(),
        format!("http://{addr}/"),
        "choreo-ms/worker",
        Duration::from_millis(200),
    );
    let envelope = EventEnvelope::new("SUPPLIER_CREATED", json!({}));

    assert!(forwarder.forward(&envelope).await.is_err());
    assert!(forwarder.handle("supplier-events", &envelope).await.is_ok());
}
