use common::RequestId;
use http::{HeaderMap, HeaderName, HeaderValue};

/// Header carrying the chain's correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headers copied from an inbound request onto every outbound call.
pub const TRACE_HEADERS: [&str; 9] = [
    REQUEST_ID_HEADER,
    "x-b3-traceid",
    "x-b3-spanid",
    "x-b3-parentspanid",
    "x-b3-sampled",
    "x-b3-flags",
    "x-ot-span-context",
    "traceparent",
    "tracestate",
];

/// Allowlisted trace headers extracted from one inbound request.
///
/// Entries keep allowlist order. Values are carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    entries: Vec<(&'static str, String)>,
}

impl TraceContext {
    /// Picks the allowlisted headers out of `headers`. Anything else is ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let entries = TRACE_HEADERS
            .iter()
            .filter_map(|name| {
                let value = headers.get(*name)?.to_str().ok()?;
                Some((*name, value.to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get(REQUEST_ID_HEADER)
    }

    /// Returns the request id, synthesizing and storing one when absent.
    pub fn ensure_request_id(&mut self) -> String {
        if let Some(existing) = self.request_id() {
            return existing.to_string();
        }
        let generated = RequestId::generate().into_inner();
        self.entries.insert(0, (REQUEST_ID_HEADER, generated.clone()));
        generated
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The context as outbound request headers.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            // Values came from valid inbound headers or from our own generator.
            if let Ok(value) = HeaderValue::from_str(value) {
                map.insert(HeaderName::from_static(*name), value);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn keeps_only_allowlisted_headers() {
        let headers = inbound(&[
            ("x-request-id", "abc"),
            ("traceparent", "00-1-2-01"),
            ("authorization", "Bearer secret"),
            ("x-custom", "nope"),
        ]);

        let trace = TraceContext::from_headers(&headers);
        let names: Vec<&str> = trace.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["x-request-id", "traceparent"]);
        assert_eq!(trace.get("authorization"), None);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-B3-TraceId").unwrap(),
            HeaderValue::from_static("t-1"),
        );
        let trace = TraceContext::from_headers(&headers);
        assert_eq!(trace.get("x-b3-traceid"), Some("t-1"));
    }

    #[test]
    fn existing_request_id_is_kept() {
        let mut trace = TraceContext::from_headers(&inbound(&[("x-request-id", "abc")]));
        assert_eq!(trace.ensure_request_id(), "abc");
        assert_eq!(trace.iter().count(), 1);
    }

    #[test]
    fn missing_request_id_is_synthesized_once() {
        let mut trace = TraceContext::default();
        let first = trace.ensure_request_id();
        let second = trace.ensure_request_id();

        assert_eq!(first, second);
        assert!(first.split_once('-').is_some());
        assert_eq!(trace.to_header_map()["x-request-id"], first.as_str());
    }
}
