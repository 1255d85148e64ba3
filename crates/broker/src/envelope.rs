use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{BrokerMessage, HEADER_EVENT_TYPE, HEADER_TIMESTAMP};
use crate::{BrokerError, EventId, Result};

/// Serializes timestamps as ISO-8601 with millisecond precision (`...T12:00:00.123Z`).
pub(crate) mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
    }
}

/// The unit of data exchanged over the broker.
///
/// Serialized as `{"eventId", "eventType", "data", "timestamp"}`. Fields are
/// read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    event_id: EventId,
    event_type: String,
    data: Value,
    #[serde(with = "iso_millis")]
    timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates an envelope with a fresh id and the current time.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_id: EventId::generate(),
            event_type: event_type.into(),
            data,
            timestamp: Utc::now().trunc_subsecs(3),
        }
    }

    /// Creates an envelope from a serializable payload.
    pub fn with_payload<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?))
    }

    /// Rebuilds an envelope whose identity was assigned elsewhere.
    pub fn from_parts(
        event_id: EventId,
        event_type: impl Into<String>,
        data: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            data,
            timestamp,
        }
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The timestamp in the wire format used by headers and payloads.
    pub fn timestamp_iso(&self) -> String {
        iso_millis::format(&self.timestamp)
    }

    /// Deserializes the payload into a typed value.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Wire shape tolerated on inbound messages: every field may be missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    event_id: Option<Value>,
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
    timestamp: Option<String>,
}

/// Turns a raw broker message into an envelope.
///
/// The payload must be a JSON object. A missing `eventType` falls back to the
/// `event-type` header, a missing `eventId` to the message key, and a missing
/// or unparsable `timestamp` to the `timestamp` header and then to now.
pub fn decode_message(message: &BrokerMessage) -> Result<EventEnvelope> {
    let wire: WireEnvelope = serde_json::from_slice(&message.payload).map_err(|e| {
        BrokerError::malformed(format!(
            "payload on {}[{}]@{} is not an event object: {e}",
            message.topic, message.partition, message.offset
        ))
    })?;

    let event_type = wire
        .event_type
        .filter(|t| !t.is_empty())
        .or_else(|| message.header(HEADER_EVENT_TYPE).map(str::to_string))
        .ok_or_else(|| BrokerError::malformed("event has no eventType and no event-type header"))?;

    let event_id = match wire.event_id {
        Some(Value::String(id)) if !id.is_empty() => EventId::from(id),
        Some(Value::Number(n)) => EventId::from(n.to_string()),
        _ => message
            .key
            .clone()
            .map(EventId::from)
            .unwrap_or_else(EventId::generate),
    };

    let timestamp = wire
        .timestamp
        .as_deref()
        .or_else(|| message.header(HEADER_TIMESTAMP))
        .and_then(|raw| iso_millis::parse(raw).ok())
        .unwrap_or_else(|| Utc::now().trunc_subsecs(3));

    Ok(EventEnvelope::from_parts(event_id, event_type, wire.data, timestamp))
}
