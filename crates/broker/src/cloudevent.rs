//! Binary-mode CloudEvents over HTTP.
//!
//! Attributes travel as `Ce-*` headers and the body is the event data.
//! Inbound events are normalized into [`EventEnvelope`]s so HTTP-pushed and
//! broker-consumed events take the same path.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::envelope::iso_millis;
use crate::{BrokerError, EventEnvelope, EventId, Result};

const CE_PREFIX: &str = "ce-";
pub const CE_ID: &str = "ce-id";
pub const CE_TYPE: &str = "ce-type";
pub const CE_SOURCE: &str = "ce-source";
pub const CE_SPECVERSION: &str = "ce-specversion";
pub const CE_TIME: &str = "ce-time";
pub const CE_SUBJECT: &str = "ce-subject";

const SUPPORTED_VERSIONS: &[&str] = &["1.0", "0.3"];

/// An event received in CloudEvents binary mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub spec_version: String,
    pub subject: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub data: Value,
    /// Any other `ce-*` attribute, keyed without the prefix.
    pub extensions: BTreeMap<String, String>,
}

impl CloudEvent {
    /// Parses headers and body.
    ///
    /// `ce-id`, `ce-type` and `ce-source` are required. `ce-specversion`, when
    /// present, must be a supported version. A non-empty body must be JSON.
    pub fn from_http(headers: &HeaderMap, body: &[u8]) -> Result<Self> {
        let mut attributes = BTreeMap::new();
        for (name, value) in headers {
            let name = name.as_str();
            if let Some(attribute) = name.strip_prefix(CE_PREFIX) {
                let value = value.to_str().map_err(|_| {
                    BrokerError::malformed(format!("header '{name}' is not valid text"))
                })?;
                attributes.insert(attribute.to_string(), value.to_string());
            }
        }

        let mut take_required = |attribute: &str| {
            attributes
                .remove(attribute)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BrokerError::malformed(format!("missing required header '{CE_PREFIX}{attribute}'")))
        };
        let id = take_required("id")?;
        let event_type = take_required("type")?;
        let source = take_required("source")?;

        let spec_version = attributes
            .remove("specversion")
            .unwrap_or_else(|| "1.0".to_string());
        if !SUPPORTED_VERSIONS.contains(&spec_version.as_str()) {
            return Err(BrokerError::malformed(format!(
                "unsupported specversion '{spec_version}'"
            )));
        }

        let time = attributes
            .remove("time")
            .map(|raw| {
                iso_millis::parse(&raw)
                    .map_err(|e| BrokerError::malformed(format!("invalid ce-time '{raw}': {e}")))
            })
            .transpose()?;
        let subject = attributes.remove("subject");

        if let Some(content_type) = headers.get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !content_type.contains("json") {
                return Err(BrokerError::malformed(format!(
                    "unsupported content type '{content_type}'"
                )));
            }
        }

        let data = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(body)
                .map_err(|e| BrokerError::malformed(format!("body is not JSON: {e}")))?
        };

        Ok(Self {
            id,
            event_type,
            source,
            spec_version,
            subject,
            time,
            data,
            extensions: attributes,
        })
    }

    /// Normalizes into an envelope. Without `ce-time` the receive time is used.
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope::from_parts(
            EventId::from(self.id.clone()),
            self.event_type.clone(),
            self.data.clone(),
            self.time.unwrap_or_else(|| Utc::now().trunc_subsecs(3)),
        )
    }
}

/// Parses an inbound push and returns both the raw event and its envelope.
pub fn normalize(headers: &HeaderMap, body: &[u8]) -> Result<(CloudEvent, EventEnvelope)> {
    let event = CloudEvent::from_http(headers, body)?;
    if !event.extensions.is_empty() {
        info!(extensions = ?event.extensions, "CloudEvent extensions");
    }
    let envelope = event.to_envelope();
    Ok((event, envelope))
}

/// Binary-mode headers for forwarding `envelope` to an event mesh.
pub fn to_cloudevent_headers(envelope: &EventEnvelope, source: &str) -> Vec<(&'static str, String)> {
    vec![
        (CE_ID, envelope.event_id().to_string()),
        (CE_TYPE, envelope.event_type().to_string()),
        (CE_SOURCE, source.to_string()),
        (CE_SPECVERSION, "1.0".to_string()),
        (CE_TIME, envelope.timestamp_iso()),
        ("content-type", "application/json".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use http::HeaderValue;
    use serde_json::json;
    use tracing_subscriber::fmt::MakeWriter;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn valid_headers() -> HeaderMap {
        headers(&[
            ("ce-id", "evt-1"),
            ("ce-type", "dev.knative.supplier.created"),
            ("ce-source", "/suppliers"),
            ("ce-specversion", "1.0"),
            ("ce-time", "2024-05-01T10:00:00.000Z"),
            ("ce-traceparent", "00-abc-def-01"),
            ("content-type", "application/json"),
        ])
    }

    #[test]
    fn parses_binary_mode_event() {
        let (event, envelope) = normalize(&valid_headers(), br#"{"name":"ACME"}"#).unwrap();

        assert_eq!(event.source, "/suppliers");
        assert_eq!(event.extensions.get("traceparent").map(String::as_str), Some("00-abc-def-01"));
        assert_eq!(envelope.event_id().as_str(), "evt-1");
        assert_eq!(envelope.event_type(), "dev.knative.supplier.created");
        assert_eq!(envelope.timestamp_iso(), "2024-05-01T10:00:00.000Z");
        assert_eq!(envelope.data(), &json!({"name": "ACME"}));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn extensions_are_logged_at_info() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            normalize(&valid_headers(), br#"{"name":"ACME"}"#).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("INFO"));
        assert!(output.contains("CloudEvent extensions"));
        assert!(output.contains("traceparent"));
    }

    #[test]
    fn missing_required_header_is_rejected() {
        let mut map = valid_headers();
        map.remove("ce-source");
        let err = CloudEvent::from_http(&map, b"{}").unwrap_err();
        assert!(err.to_string().contains("ce-source"));
    }

    #[test]
    fn unsupported_specversion_is_rejected() {
        let mut map = valid_headers();
        map.insert("ce-specversion", HeaderValue::from_static("2.0"));
        assert!(CloudEvent::from_http(&map, b"{}").is_err());
    }

    #[test]
    fn non_json_body_is_rejected() {
        let mut map = valid_headers();
        map.remove("content-type");
        assert!(matches!(
            CloudEvent::from_http(&map, b"<xml/>"),
            Err(BrokerError::MalformedEvent(_))
        ));
    }

    #[test]
    fn empty_body_becomes_null_data() {
        let event = CloudEvent::from_http(&valid_headers(), b"").unwrap();
        assert_eq!(event.data, Value::Null);
    }

    #[test]
    fn egress_headers_describe_envelope() {
        let envelope = EventEnvelope::new("SUPPLIER_CREATED", json!({}));
        let headers: BTreeMap<_, _> = to_cloudevent_headers(&envelope, "choreo-ms")
            .into_iter()
            .collect();

        assert_eq!(headers[CE_ID], envelope.event_id().as_str());
        assert_eq!(headers[CE_TYPE], "SUPPLIER_CREATED");
        assert_eq!(headers[CE_SOURCE], "choreo-ms");
        assert_eq!(headers[CE_SPECVERSION], "1.0");
    }
}
