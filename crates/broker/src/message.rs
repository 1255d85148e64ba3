use std::collections::BTreeMap;

use crate::{EventEnvelope, Result};

/// Header carrying the event type on every published message.
pub const HEADER_EVENT_TYPE: &str = "event-type";

/// Header carrying the event timestamp (ISO-8601) on every published message.
pub const HEADER_TIMESTAMP: &str = "timestamp";

/// Message headers. Values are UTF-8; non-UTF-8 broker headers are dropped on receipt.
pub type Headers = BTreeMap<String, String>;

/// A message ready to be handed to a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

impl OutboundMessage {
    /// Encodes an envelope: key is the event id, headers carry type and timestamp.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self> {
        let mut headers = Headers::new();
        headers.insert(HEADER_EVENT_TYPE.to_string(), envelope.event_type().to_string());
        headers.insert(HEADER_TIMESTAMP.to_string(), envelope.timestamp_iso());

        Ok(Self {
            key: Some(envelope.event_id().to_string()),
            payload: envelope.to_bytes()?,
            headers,
        })
    }
}

/// A message as received from a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

impl BrokerMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_message_keys_by_event_id() {
        let envelope = EventEnvelope::new("SUPPLIER_CREATED", serde_json::json!({"id": 1}));
        let message = OutboundMessage::from_envelope(&envelope).unwrap();

        assert_eq!(message.key.as_deref(), Some(envelope.event_id().as_str()));
        assert_eq!(message.headers[HEADER_EVENT_TYPE], "SUPPLIER_CREATED");
        assert_eq!(message.headers[HEADER_TIMESTAMP], envelope.timestamp_iso());
    }
}
