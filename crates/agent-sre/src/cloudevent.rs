//! CloudEvent envelope parsing and rendering.
//!
//! Two inbound modes: structured (`application/cloudevents+json`, the full
//! envelope in the body) and binary (`ce-*` headers carry the attributes,
//! the body is the data payload). Outbound invocations always use binary
//! mode.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{truncate_payload, AgentError};

pub const SPEC_VERSION: &str = "1.0";

/// Event types the agent acts on.
pub const ALERT_FIRED: &str = "io.homelab.prometheus.alert.fired";
pub const ALERT_RESOLVED: &str = "io.homelab.prometheus.alert.resolved";
pub const REMEDIATION_REQUEST: &str = "io.homelab.agent-sre.remediation.request";

/// A CloudEvents 1.0 envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(default = "default_specversion")]
    pub specversion: String,
    /// `correlationid` extension attribute.
    #[serde(
        rename = "correlationid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

fn default_specversion() -> String {
    SPEC_VERSION.to_string()
}

impl CloudEvent {
    /// Build an outbound event.
    #[must_use]
    pub fn new(event_type: &str, source: &str, id: &str, data: Value) -> Self {
        Self {
            id: id.to_string(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            specversion: SPEC_VERSION.to_string(),
            correlation_id: None,
            data,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    /// Parse an inbound HTTP request into a CloudEvent.
    ///
    /// Structured mode is selected when the Content-Type contains
    /// `application/cloudevents+json`; binary mode when `ce-id` and
    /// `ce-type` headers are present. Anything else is a parse error.
    pub fn parse(headers: &HeaderMap, body: &[u8]) -> Result<Self, AgentError> {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains("application/cloudevents+json") {
            return Self::parse_structured(body);
        }

        if headers.contains_key("ce-id") && headers.contains_key("ce-type") {
            return Self::parse_binary(headers, body);
        }

        // Some producers send structured events with a plain JSON
        // content type; accept them when the envelope fields are present.
        if let Ok(event) = Self::parse_structured(body) {
            return Ok(event);
        }

        Err(AgentError::Parse(format!(
            "request is neither binary nor structured CloudEvent (content-type: {content_type})"
        )))
    }

    fn parse_structured(body: &[u8]) -> Result<Self, AgentError> {
        let event: Self = serde_json::from_slice(body).map_err(|e| {
            AgentError::Parse(format!(
                "malformed structured CloudEvent: {e}; body: {}",
                truncate_payload(&String::from_utf8_lossy(body))
            ))
        })?;

        if event.id.is_empty() || event.event_type.is_empty() || event.source.is_empty() {
            return Err(AgentError::Parse(
                "structured CloudEvent missing id, type, or source".to_string(),
            ));
        }
        Ok(event)
    }

    fn parse_binary(headers: &HeaderMap, body: &[u8]) -> Result<Self, AgentError> {
        let attr = |name: &str| -> Option<String> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };

        let id = attr("ce-id")
            .ok_or_else(|| AgentError::Parse("missing ce-id header".to_string()))?;
        let event_type = attr("ce-type")
            .ok_or_else(|| AgentError::Parse("missing ce-type header".to_string()))?;
        let source = attr("ce-source").unwrap_or_default();
        let specversion = attr("ce-specversion").unwrap_or_else(|| SPEC_VERSION.to_string());
        let correlation_id = attr("ce-correlationid");

        let data = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body).map_err(|e| {
                AgentError::Parse(format!(
                    "malformed binary CloudEvent data: {e}; body: {}",
                    truncate_payload(&String::from_utf8_lossy(body))
                ))
            })?
        };

        Ok(Self {
            id,
            event_type,
            source,
            specversion,
            correlation_id,
            data,
        })
    }

    /// Render the `ce-*` headers for an outbound binary-mode request.
    #[must_use]
    pub fn binary_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("ce-id".to_string(), self.id.clone()),
            ("ce-type".to_string(), self.event_type.clone()),
            ("ce-source".to_string(), self.source.clone()),
            ("ce-specversion".to_string(), self.specversion.clone()),
            ("content-type".to_string(), "application/json".to_string()),
        ];
        if let Some(correlation_id) = &self.correlation_id {
            headers.push(("ce-correlationid".to_string(), correlation_id.clone()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_parse_structured() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/cloudevents+json"),
        );
        let body = json!({
            "id": "evt-1",
            "type": ALERT_FIRED,
            "source": "prometheus",
            "specversion": "1.0",
            "data": { "labels": { "alertname": "PodCrashLooping" } }
        });

        let event = CloudEvent::parse(&headers, body.to_string().as_bytes()).unwrap();
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.event_type, ALERT_FIRED);
        assert_eq!(event.data["labels"]["alertname"], "PodCrashLooping");
    }

    #[test]
    fn test_parse_binary() {
        let mut headers = HeaderMap::new();
        headers.insert("ce-id", HeaderValue::from_static("evt-2"));
        headers.insert("ce-type", HeaderValue::from_static(ALERT_FIRED));
        headers.insert("ce-source", HeaderValue::from_static("prometheus"));
        headers.insert("ce-correlationid", HeaderValue::from_static("corr-2"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let body = json!({ "labels": { "alertname": "HighMemory" } });
        let event = CloudEvent::parse(&headers, body.to_string().as_bytes()).unwrap();
        assert_eq!(event.id, "evt-2");
        assert_eq!(event.source, "prometheus");
        assert_eq!(event.correlation_id.as_deref(), Some("corr-2"));
        assert_eq!(event.data["labels"]["alertname"], "HighMemory");
    }

    #[test]
    fn test_parse_rejects_missing_required_fields() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/cloudevents+json"),
        );
        let body = json!({ "id": "evt-3", "type": ALERT_FIRED });
        let err = CloudEvent::parse(&headers, body.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_parse_rejects_non_cloudevent() {
        let headers = HeaderMap::new();
        let err = CloudEvent::parse(&headers, b"not json").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_binary_headers_round_trip() {
        let event = CloudEvent::new(REMEDIATION_REQUEST, "agent-sre", "corr-9", json!({}))
            .with_correlation_id("corr-9");
        let rendered = event.binary_headers();

        let mut headers = HeaderMap::new();
        for (name, value) in &rendered {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        let parsed = CloudEvent::parse(&headers, b"{}").unwrap();
        assert_eq!(parsed.id, "corr-9");
        assert_eq!(parsed.event_type, REMEDIATION_REQUEST);
        assert_eq!(parsed.correlation_id.as_deref(), Some("corr-9"));
    }
}
