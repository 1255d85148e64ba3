//! Fire-and-forget audit trail of handled requests.

use std::sync::Arc;

use async_trait::async_trait;
use chain::TraceContext;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

/// Serialized bodies above this size are replaced by a preview.
pub const MAX_AUDIT_BODY_BYTES: usize = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct AuditRequest {
    pub path: String,
    pub query: Value,
    pub body: Value,
}

/// One audited request and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: String,
    pub ts: String,
    pub service: String,
    pub endpoint: String,
    pub method: String,
    pub trace: Value,
    pub request: AuditRequest,
    pub result: Value,
}

impl AuditEntry {
    pub fn new(
        service: &str,
        endpoint: &str,
        method: &str,
        trace: &TraceContext,
        request: AuditRequest,
        result: Value,
    ) -> Self {
        let trace = trace
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect::<serde_json::Map<_, _>>();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ts: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            trace: Value::Object(trace),
            request: AuditRequest {
                body: truncate(request.body),
                ..request
            },
            result: truncate(result),
        }
    }
}

/// Replaces values whose JSON form exceeds [`MAX_AUDIT_BODY_BYTES`] with
/// `{truncated: true, preview}`.
pub fn truncate(value: Value) -> Value {
    let serialized = value.to_string();
    if serialized.len() <= MAX_AUDIT_BODY_BYTES {
        return value;
    }
    let mut end = MAX_AUDIT_BODY_BYTES;
    while !serialized.is_char_boundary(end) {
        end -= 1;
    }
    json!({ "truncated": true, "preview": &serialized[..end] })
}

/// Destination for audit entries. Recording must never fail the request.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Records `entry` on a background task.
pub fn spawn_record(sink: &Arc<dyn AuditSink>, entry: AuditEntry) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move { sink.record(entry).await });
}

/// Emits entries as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        metrics::counter!("audit_entries_total", "endpoint" => entry.endpoint.clone()).increment(1);
        match serde_json::to_string(&entry) {
            Ok(json) => tracing::info!(
                target: "audit",
                id = %entry.id,
                endpoint = %entry.endpoint,
                method = %entry.method,
                entry = %json,
                "request audited"
            ),
            Err(e) => tracing::warn!(target: "audit", error = %e, "audit entry not serializable"),
        }
    }
}

/// Keeps entries in memory, for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditEntry) {
        self.entries.lock().await.push(entry);
    }
}
