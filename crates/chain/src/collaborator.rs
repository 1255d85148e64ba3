//! Collaborator capability and its HTTP / in-memory implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use serde_json::Value;

use crate::{ChainError, Result, TraceContext};

/// One outbound call as seen by a collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct CollaboratorRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub payload: Option<Value>,
    pub trace: TraceContext,
}

/// A collaborator's answer, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct CollaboratorResponse {
    pub status: u16,
    pub data: Value,
}

impl CollaboratorResponse {
    pub fn ok(data: Value) -> Self {
        Self { status: 200, data }
    }

    pub fn with_status(status: u16, data: Value) -> Self {
        Self { status, data }
    }
}

/// A downstream service the orchestrator can call.
///
/// Any answer, including a non-2xx one, is a `CollaboratorResponse`; only
/// failures to get an answer are errors.
#[async_trait]
pub trait Collaborator: Send + Sync {
    fn name(&self) -> &str;

    /// Address reported in call results for `path` and `query`.
    fn url(&self, path: &str, query: &[(String, String)]) -> String;

    async fn call(&self, request: &CollaboratorRequest) -> Result<CollaboratorResponse>;
}

fn display_url(base: &str, path: &str, query: &[(String, String)]) -> String {
    let plain = format!("{base}{path}");
    if query.is_empty() {
        return plain;
    }
    reqwest::Url::parse_with_params(&plain, query)
        .map(String::from)
        .unwrap_or(plain)
}

/// Interprets a response body: JSON when possible, text otherwise.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Calls a collaborator over HTTP with a per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    name: String,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpCollaborator {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            name: name.into(),
            base_url,
            client,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: reqwest::Error) -> ChainError {
        if e.is_timeout() {
            ChainError::Timeout(self.timeout)
        } else {
            ChainError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Collaborator for HttpCollaborator {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> String {
        display_url(&self.base_url, path, query)
    }

    async fn call(&self, request: &CollaboratorRequest) -> Result<CollaboratorResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.trace.to_header_map())
            .timeout(self.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(CollaboratorResponse {
            status,
            data: parse_body(&body),
        })
    }
}

type Route = Arc<dyn Fn(&CollaboratorRequest) -> CollaboratorResponse + Send + Sync>;

#[derive(Default)]
struct InMemoryState {
    routes: HashMap<String, Route>,
    calls: Vec<CollaboratorRequest>,
    failure: Option<String>,
    delay: Option<Duration>,
}

/// A collaborator answered by closures, for tests and local wiring.
///
/// Unrouted paths answer 404. Every call is recorded.
#[derive(Clone)]
pub struct InMemoryCollaborator {
    name: String,
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryCollaborator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers `path` with `handler`.
    pub fn route<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&CollaboratorRequest) -> CollaboratorResponse + Send + Sync + 'static,
    {
        self.state().routes.insert(path.into(), Arc::new(handler));
        self
    }

    /// Answers `path` with 200 and `{received: <payload>}`.
    pub fn echo(self, path: impl Into<String>) -> Self {
        self.route(path, |request| {
            CollaboratorResponse::ok(serde_json::json!({
                "received": request.payload.clone().unwrap_or(Value::Null)
            }))
        })
    }

    /// While set, every call fails with a transport error carrying `reason`.
    pub fn set_failure(&self, reason: Option<&str>) {
        self.state().failure = reason.map(str::to_string);
    }

    /// Delays every answer, e.g. to exceed the orchestrator timeout.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    pub fn calls(&self) -> Vec<CollaboratorRequest> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl Collaborator for InMemoryCollaborator {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> String {
        display_url(&format!("http://{}", self.name), path, query)
    }

    async fn call(&self, request: &CollaboratorRequest) -> Result<CollaboratorResponse> {
        let (delay, failure, route) = {
            let mut state = self.state();
            state.calls.push(request.clone());
            (
                state.delay,
                state.failure.clone(),
                state.routes.get(&request.path).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = failure {
            return Err(ChainError::Transport(reason));
        }

        Ok(match route {
            Some(handler) => handler(request),
            None => CollaboratorResponse::with_status(
                404,
                serde_json::json!({ "error": format!("no route for {}", request.path) }),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> CollaboratorRequest {
        CollaboratorRequest {
            method: Method::POST,
            path: path.to_string(),
            query: vec![],
            payload: Some(serde_json::json!({"sku": "SKU-1"})),
            trace: TraceContext::default(),
        }
    }

    #[test]
    fn url_includes_encoded_query() {
        let collaborator = InMemoryCollaborator::new("normativa-ms");
        let url = collaborator.url(
            "/terms-of-delivery",
            &[("routeId".to_string(), "R-001".to_string())],
        );
        assert_eq!(url, "http://normativa-ms/terms-of-delivery?routeId=R-001");
    }

    #[test]
    fn body_parsing_falls_back_to_text() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(parse_body(b"plain"), Value::String("plain".into()));
    }

    #[tokio::test]
    async fn in_memory_routes_and_records() {
        let collaborator = InMemoryCollaborator::new("centro").echo("/store");

        let response = collaborator.call(&request("/store")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.data["received"]["sku"], "SKU-1");

        let missing = collaborator.call(&request("/nope")).await.unwrap();
        assert_eq!(missing.status, 404);
        assert_eq!(collaborator.calls().len(), 2);
    }

    #[tokio::test]
    async fn in_memory_failure_is_transport_error() {
        let collaborator = InMemoryCollaborator::new("centro").echo("/store");
        collaborator.set_failure(Some("connection refused"));

        let result = collaborator.call(&request("/store")).await;
        assert!(matches!(result, Err(ChainError::Transport(ref r)) if r == "connection refused"));
    }

    #[test]
    fn http_collaborator_trims_trailing_slash() {
        let collaborator = HttpCollaborator::new(
            "ruta",
            "http://ruta-ms/",
            reqwest::Client::new(),
            Duration::from_secs(3),
        );
        assert_eq!(collaborator.url("/plan", &[]), "http://ruta-ms/plan");
    }
}
