//! HTTP route handlers.

pub mod chains;
pub mod events;
pub mod health;
pub mod leaf;
pub mod medicines;
pub mod metrics;
pub mod purchase_plans;
pub mod sales;
pub mod suppliers;

use std::collections::BTreeMap;

use axum::extract::{FromRequest, Query, Request};
use axum::http::{HeaderMap, Method};
use chain::InboundRequest;
use chrono::{SecondsFormat, Utc};
use common::RecordId;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::audit::AuditRequest;
use crate::error::ApiError;

/// Largest request body accepted by the permissive endpoints.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a `{id}` path segment naming a `kind` record.
pub(crate) fn record_id(kind: &str, id: &str) -> Result<RecordId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {kind} id: {id}")))
}

/// Reads a JSON body as `T`, naming `kind` in the rejection.
pub(crate) fn parse_body<T: DeserializeOwned>(kind: &str, body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("Invalid {kind}: {e}")))
}

/// A request to one of the permissive endpoints: any method, optional JSON body.
///
/// An empty body reads as `{}`.
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub body: Value,
}

impl InboundCall {
    /// A string field of the body, if present and non-empty.
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.body
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn inbound(&self) -> InboundRequest {
        InboundRequest::new(self.headers.clone(), self.body.clone())
    }

    pub fn audit_request(&self) -> AuditRequest {
        let query = self
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<_, _>>();
        AuditRequest {
            path: self.path.clone(),
            query: Value::Object(query),
            body: self.body.clone(),
        }
    }
}

impl<S: Send + Sync> FromRequest<S> for InboundCall {
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();

        let Query(query) = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {e}")))?;
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Unreadable request body: {e}")))?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| ApiError::BadRequest(format!("Request body is not valid JSON: {e}")))?
        };

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query,
            headers: parts.headers,
            body,
        })
    }
}
