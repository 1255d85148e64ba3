//! CloudEvent egress to an event mesh ingress.

use std::time::Duration;

use async_trait::async_trait;
use broker::{EventEnvelope, to_cloudevent_headers};
use consumer::{EventHandler, HandlerError};
use tracing::{debug, warn};

use crate::{ChainError, Result};

/// POSTs envelopes to a broker ingress as binary-mode CloudEvents.
///
/// As an [`EventHandler`] it never fails: delivery problems are logged and
/// the consumer loop moves on.
#[derive(Debug, Clone)]
pub struct EventMeshForwarder {
    client: reqwest::Client,
    url: String,
    source: String,
    timeout: Duration,
}

impl EventMeshForwarder {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            source: source.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one envelope. Returns the ingress status on a 2xx answer.
    pub async fn forward(&self, envelope: &EventEnvelope) -> Result<u16> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .body(serde_json::to_vec(envelope.data()).unwrap_or_default());
        for (name, value) in to_cloudevent_headers(envelope, &self.source) {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ChainError::Timeout(self.timeout)
            } else {
                ChainError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Status(status.as_u16()));
        }
        Ok(status.as_u16())
    }
}

#[async_trait]
impl EventHandler for EventMeshForwarder {
    fn name(&self) -> &'static str {
        "EventMeshForwarder"
    }

    async fn handle(&self, topic: &str, event: &EventEnvelope) -> std::result::Result<(), HandlerError> {
        match self.forward(event).await {
            Ok(status) => debug!(
                topic,
                event_id = %event.event_id(),
                status,
                "Forwarded event to mesh"
            ),
            Err(e) => warn!(
                topic,
                event_id = %event.event_id(),
                url = %self.url,
                error = %e,
                "Failed to forward event to mesh"
            ),
        }
        Ok(())
    }
}
