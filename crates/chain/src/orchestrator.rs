//! Chain orchestrator for fanning one inbound request out to collaborators.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{HeaderMap, Method};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    ChainCallResult, ChainError, ChainReport, Collaborator, CollaboratorRequest, TraceContext,
};

/// Builds a step's payload from the inbound request body.
pub type PayloadRule = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One step of a chain: which collaborator, where, how, and with what body.
#[derive(Clone)]
pub struct CallSpec {
    collaborator: String,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    payload: Option<PayloadRule>,
}

impl CallSpec {
    pub fn new(method: Method, collaborator: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            payload: None,
        }
    }

    pub fn post(collaborator: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::POST, collaborator, path)
    }

    pub fn get(collaborator: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::GET, collaborator, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn payload<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.payload = Some(Arc::new(rule));
        self
    }

    pub fn collaborator(&self) -> &str {
        &self.collaborator
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl fmt::Debug for CallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSpec")
            .field("collaborator", &self.collaborator)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// The parts of an inbound request a chain needs.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub headers: HeaderMap,
    pub body: Value,
}

impl InboundRequest {
    pub fn new(headers: HeaderMap, body: Value) -> Self {
        Self { headers, body }
    }
}

/// Runs chains of collaborator calls.
///
/// Steps run one after another in declaration order. Every step is attempted
/// regardless of earlier outcomes, each under the same timeout, and each
/// yields exactly one [`ChainCallResult`].
#[derive(Clone)]
pub struct ChainOrchestrator {
    collaborators: HashMap<String, Arc<dyn Collaborator>>,
    timeout: Duration,
}

impl ChainOrchestrator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            collaborators: HashMap::new(),
            timeout,
        }
    }

    /// Registers a collaborator under its own name, replacing any previous one.
    pub fn register(&mut self, collaborator: Arc<dyn Collaborator>) {
        self.collaborators
            .insert(collaborator.name().to_string(), collaborator);
    }

    pub fn with(mut self, collaborator: impl Collaborator + 'static) -> Self {
        self.register(Arc::new(collaborator));
        self
    }

    pub fn collaborator(&self, name: &str) -> Option<&Arc<dyn Collaborator>> {
        self.collaborators.get(name)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempts every step and reports what happened, in step order.
    ///
    /// All calls carry the inbound trace headers plus one shared
    /// `x-request-id`, synthesized when the request had none.
    #[instrument(skip_all, fields(steps = steps.len(), request_id = tracing::field::Empty))]
    pub async fn run_chain(&self, request: &InboundRequest, steps: &[CallSpec]) -> ChainReport {
        let mut trace = TraceContext::from_headers(&request.headers);
        let request_id = trace.ensure_request_id();
        tracing::Span::current().record("request_id", request_id.as_str());

        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            results.push(self.run_step(step, &request.body, &trace).await);
        }

        let report = ChainReport {
            request_id,
            results,
        };
        info!(failures = report.failures(), "Chain finished");
        report
    }

    async fn run_step(&self, step: &CallSpec, body: &Value, trace: &TraceContext) -> ChainCallResult {
        let Some(collaborator) = self.collaborators.get(step.collaborator()) else {
            let error = ChainError::UnknownCollaborator(step.collaborator().to_string());
            warn!(collaborator = step.collaborator(), path = step.path(), "{error}");
            metrics::counter!("chain_calls_total", "outcome" => "error").increment(1);
            return ChainCallResult::failed(
                format!("{}{}", step.collaborator(), step.path()),
                &error,
            );
        };

        let url = collaborator.url(step.path(), &step.query);
        let call = CollaboratorRequest {
            method: step.method.clone(),
            path: step.path.clone(),
            query: step.query.clone(),
            payload: step.payload.as_ref().map(|rule| rule(body)),
            trace: trace.clone(),
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, collaborator.call(&call))
            .await
            .unwrap_or(Err(ChainError::Timeout(self.timeout)));
        metrics::histogram!("chain_call_duration_seconds").record(started.elapsed().as_secs_f64());

        let result = match outcome {
            Ok(response) => ChainCallResult::answered(url, response.status, response.data),
            Err(e) => ChainCallResult::failed(url, &e),
        };

        let outcome_label = if result.ok { "ok" } else { "error" };
        metrics::counter!("chain_calls_total", "outcome" => outcome_label).increment(1);
        if result.ok {
            info!(url = %result.url, status = ?result.status, "Collaborator call succeeded");
        } else {
            warn!(
                url = %result.url,
                status = ?result.status,
                error = result.error.as_deref().unwrap_or_default(),
                "Collaborator call failed"
            );
        }
        result
    }
}
