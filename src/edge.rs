//! Edge request/response descriptors
//!
//! Mirrors the CloudFront viewer-request event: headers are keyed by
//! lowercase name, each holding a list of `{key, value}` entries.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Viewer-request event as delivered by the edge substrate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeEvent {
    /// Event records; only the first is authorized
    #[serde(rename = "Records", default)]
    pub records: Vec<EdgeRecord>,
}

impl EdgeEvent {
    /// Wrap a single request
    #[must_use]
    pub fn from_request(request: EdgeRequest) -> Self {
        Self {
            records: vec![EdgeRecord {
                cf: CloudFrontPayload { request },
            }],
        }
    }

    /// The request of the first record
    #[must_use]
    pub fn request(&self) -> Option<&EdgeRequest> {
        self.records.first().map(|r| &r.cf.request)
    }
}

/// One event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// CloudFront payload
    pub cf: CloudFrontPayload,
}

/// CloudFront payload of a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudFrontPayload {
    /// Incoming request
    pub request: EdgeRequest,
}

/// Single header entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Header name as sent by the client
    #[serde(alias = "name", default)]
    pub key: String,
    /// Header value
    pub value: String,
}

impl HeaderEntry {
    /// Build an entry
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Incoming request descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeRequest {
    /// Request path
    #[serde(default)]
    pub uri: String,
    /// HTTP method
    #[serde(default)]
    pub method: String,
    /// Raw query string without `?`
    #[serde(default)]
    pub querystring: String,
    /// Headers by name
    #[serde(default)]
    pub headers: HashMap<String, Vec<HeaderEntry>>,
}

impl EdgeRequest {
    /// Create a request with no headers
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    /// Append a header entry under its lowercase name
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(HeaderEntry::new(name, value));
        self
    }

    /// First value of header `name`.
    ///
    /// The lowercase map key wins; other spellings are only consulted when it
    /// is absent, picking the lexicographically smallest for a stable result.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        self.headers
            .get(&lower)
            .or_else(|| {
                self.headers
                    .iter()
                    .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                    .min_by(|(a, _), (b, _)| a.cmp(b))
                    .map(|(_, entries)| entries)
            })
            .and_then(|entries| entries.first())
            .map(|e| e.value.as_str())
    }
}

/// Response generated at the edge instead of forwarding to the origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResponse {
    /// Status code as a string
    pub status: String,
    /// Reason phrase
    pub status_description: String,
    /// Body text
    pub body: String,
    /// Body encoding (`text` or `base64`)
    pub body_encoding: String,
    /// Headers by lowercase name
    pub headers: BTreeMap<String, Vec<HeaderEntry>>,
}

impl EdgeResponse {
    /// The fixed denial returned for every failed authorization
    #[must_use]
    pub fn unauthorized() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            vec![HeaderEntry::new("Content-Type", "text/plain")],
        );
        Self {
            status: "401".to_string(),
            status_description: "401 Unauthorized".to_string(),
            body: "401 Unauthorized".to_string(),
            body_encoding: "text".to_string(),
            headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserializes_viewer_request_event() {
        let event: EdgeEvent = serde_json::from_value(json!({
            "Records": [{
                "cf": {
                    "config": {"distributionId": "EDFDVBD6EXAMPLE", "eventType": "viewer-request"},
                    "request": {
                        "clientIp": "203.0.113.178",
                        "method": "GET",
                        "uri": "/index.html",
                        "querystring": "a=1",
                        "headers": {
                            "host": [{"key": "Host", "value": "d111111abcdef8.cloudfront.net"}],
                            "cookie": [
                                {"key": "Cookie", "value": "first=1"},
                                {"key": "Cookie", "value": "second=2"}
                            ]
                        }
                    }
                }
            }]
        }))
        .unwrap();

        let request = event.request().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.uri, "/index.html");
        assert_eq!(request.querystring, "a=1");
        assert_eq!(request.header("Cookie"), Some("first=1"));
        assert_eq!(request.header("HOST"), Some("d111111abcdef8.cloudfront.net"));
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn lowercase_header_key_wins_over_other_spellings() {
        let mut request = EdgeRequest::new("GET", "/");
        for (key, value) in [("Cookie", "mixed=1"), ("COOKIE", "upper=1"), ("cookie", "lower=1")] {
            request
                .headers
                .insert(key.to_string(), vec![HeaderEntry::new("Cookie", value)]);
        }
        for _ in 0..8 {
            assert_eq!(request.header("Cookie"), Some("lower=1"));
        }

        request.headers.remove("cookie");
        assert_eq!(request.header("cookie"), Some("upper=1"));
    }

    #[test]
    fn header_entries_accept_name_alias() {
        let entry: HeaderEntry =
            serde_json::from_value(json!({"name": "Cookie", "value": "a=b"})).unwrap();
        assert_eq!(entry, HeaderEntry::new("Cookie", "a=b"));
    }

    #[test]
    fn unauthorized_response_shape() {
        let value = serde_json::to_value(EdgeResponse::unauthorized()).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "401",
                "statusDescription": "401 Unauthorized",
                "body": "401 Unauthorized",
                "bodyEncoding": "text",
                "headers": {
                    "content-type": [{"key": "Content-Type", "value": "text/plain"}]
                }
            })
        );
    }

    #[test]
    fn empty_event_has_no_request() {
        let event: EdgeEvent = serde_json::from_str("{}").unwrap();
        assert!(event.request().is_none());
    }
}
