use serde::Serialize;
use serde_json::Value;

use crate::ChainError;

/// Outcome of one attempted collaborator call.
///
/// Serialized as `{ok, url, status, data}` when the collaborator answered,
/// whatever the status, and `{ok: false, url, error}` when it never did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainCallResult {
    pub ok: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChainCallResult {
    /// A call answered with `status`. Any answer counts as ok; callers read
    /// `status` to tell a 4xx from a 2xx.
    pub fn answered(url: impl Into<String>, status: u16, data: Value) -> Self {
        Self {
            ok: true,
            url: url.into(),
            status: Some(status),
            data: Some(data),
            error: None,
        }
    }

    /// A call that never produced a response.
    pub fn failed(url: impl Into<String>, error: &ChainError) -> Self {
        Self {
            ok: false,
            url: url.into(),
            status: None,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Results of one chain run, in step order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub request_id: String,
    pub results: Vec<ChainCallResult>,
}

impl ChainReport {
    /// True when at least one step ran and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| !r.ok)
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.ok).count()
    }
}
