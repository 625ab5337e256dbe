//! Correlation IDs, metric families, and the remediation guard.
//!
//! A correlation ID is produced for every inbound event and propagated
//! through logs, spans, and outbound HTTP calls. Telemetry failures are
//! swallowed and logged once per process; they never reach callers.

use axum::http::HeaderMap;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use rand::Rng;
use std::sync::Once;
use std::time::Instant;
use uuid::Uuid;

static REGISTRATION_WARNING: Once = Once::new();

fn warn_once(name: &str) {
    REGISTRATION_WARNING.call_once(|| {
        tracing::warn!(metric = name, "metric registration failed; telemetry disabled");
    });
}

static CLOUDEVENTS_RECEIVED: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_sre_cloudevents_received_total",
        "Total number of CloudEvents received",
        &["event_type", "event_source"]
    )
    .map_err(|_| warn_once("agent_sre_cloudevents_received_total"))
    .ok()
});

static REMEDIATION_ATTEMPTS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_sre_remediation_attempts_total",
        "Total number of remediation attempts",
        &["alertname", "lambda_function", "status"]
    )
    .map_err(|_| warn_once("agent_sre_remediation_attempts_total"))
    .ok()
});

static REMEDIATION_DURATION: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    register_histogram_vec!(
        "agent_sre_remediation_duration_seconds",
        "Duration of remediation operations in seconds",
        &["lambda_function", "status"]
    )
    .map_err(|_| warn_once("agent_sre_remediation_duration_seconds"))
    .ok()
});

static ACTIVE_REMEDIATIONS: Lazy<Option<IntGauge>> = Lazy::new(|| {
    register_int_gauge!(
        "agent_sre_active_remediations",
        "Number of active remediation operations"
    )
    .map_err(|_| warn_once("agent_sre_active_remediations"))
    .ok()
});

static SELECTOR_INFERENCE: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_sre_selector_inference_total",
        "Selector phase attempts by method and status",
        &["method", "status"]
    )
    .map_err(|_| warn_once("agent_sre_selector_inference_total"))
    .ok()
});

static SELECTOR_FALLBACK: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_sre_selector_fallback_total",
        "Times the selector fell back to a cheaper phase",
        &["reason"]
    )
    .map_err(|_| warn_once("agent_sre_selector_fallback_total"))
    .ok()
});

static SELECTOR_CONFIDENCE: Lazy<Option<Histogram>> = Lazy::new(|| {
    register_histogram!(
        "agent_sre_selector_confidence_score",
        "Calibrated confidence of emitted selections",
        vec![0.1, 0.3, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
    )
    .map_err(|_| warn_once("agent_sre_selector_confidence_score"))
    .ok()
});

/// Extract or generate the correlation ID for an inbound event.
///
/// Preference order: `X-Correlation-ID` header, CloudEvent id (`ce-id`
/// header or the parsed event id), W3C `traceparent` trace-id, then a
/// freshly generated UUIDv4.
#[must_use]
pub fn correlation_id_from(event_id: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(value) = header_str(headers, "x-correlation-id") {
        return value.to_string();
    }
    if let Some(value) = header_str(headers, "ce-id") {
        return value.to_string();
    }
    if let Some(event_id) = event_id {
        if !event_id.is_empty() {
            return event_id.to_string();
        }
    }
    if let Some(trace_id) =
        header_str(headers, "traceparent").and_then(trace_id_from_traceparent)
    {
        return trace_id;
    }
    Uuid::new_v4().to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Pull the 32-hex trace-id field out of a W3C traceparent value.
fn trace_id_from_traceparent(value: &str) -> Option<String> {
    let trace_id = value.split('-').nth(1)?;
    if trace_id.len() == 32 && trace_id.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(trace_id.to_string())
    } else {
        None
    }
}

/// Render a W3C traceparent header for an outbound call in this
/// correlation chain. Returns `None` when the correlation ID cannot carry
/// a 32-hex trace id.
#[must_use]
pub fn traceparent_for(correlation_id: &str) -> Option<String> {
    let hex: String = correlation_id
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_ascii_lowercase();
    if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let span_id: String = {
        let mut rng = rand::thread_rng();
        (0..16)
            .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
            .collect()
    };
    Some(format!("00-{hex}-{span_id}-01"))
}

/// Record an inbound CloudEvent.
pub fn record_cloudevent_received(event_type: &str, event_source: &str) {
    if let Some(counter) = CLOUDEVENTS_RECEIVED.as_ref() {
        counter.with_label_values(&[event_type, event_source]).inc();
    }
}

/// Record a selector phase attempt.
pub fn record_selector_inference(method: &str, status: &str) {
    if let Some(counter) = SELECTOR_INFERENCE.as_ref() {
        counter.with_label_values(&[method, status]).inc();
    }
}

/// Record a selector fallback.
pub fn record_selector_fallback(reason: &str) {
    if let Some(counter) = SELECTOR_FALLBACK.as_ref() {
        counter.with_label_values(&[reason]).inc();
    }
}

/// Record the calibrated confidence of an emitted selection.
pub fn record_selector_confidence(confidence: f64) {
    if let Some(histogram) = SELECTOR_CONFIDENCE.as_ref() {
        histogram.observe(confidence);
    }
}

/// Guard wrapping one remediation attempt.
///
/// Creation increments the active-remediations gauge; drop decrements it
/// and records the attempt counter and duration histogram with the final
/// status (`error` unless [`RemediationGuard::succeed`] was called).
pub struct RemediationGuard {
    alertname: String,
    lambda_function: String,
    start: Instant,
    status: &'static str,
}

impl RemediationGuard {
    #[must_use]
    pub fn new(alertname: &str, lambda_function: &str) -> Self {
        if let Some(gauge) = ACTIVE_REMEDIATIONS.as_ref() {
            gauge.inc();
        }
        Self {
            alertname: alertname.to_string(),
            lambda_function: lambda_function.to_string(),
            start: Instant::now(),
            status: "error",
        }
    }

    /// Mark the attempt successful before the guard drops.
    pub fn succeed(&mut self) {
        self.status = "success";
    }
}

impl Drop for RemediationGuard {
    fn drop(&mut self) {
        if let Some(gauge) = ACTIVE_REMEDIATIONS.as_ref() {
            gauge.dec();
        }
        if let Some(counter) = REMEDIATION_ATTEMPTS.as_ref() {
            counter
                .with_label_values(&[&self.alertname, &self.lambda_function, self.status])
                .inc();
        }
        if let Some(histogram) = REMEDIATION_DURATION.as_ref() {
            histogram
                .with_label_values(&[&self.lambda_function, self.status])
                .observe(self.start.elapsed().as_secs_f64());
        }
    }
}

/// Encode the default registry for the `/metrics` scrape endpoint.
#[must_use]
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .unwrap_or_else(|error| {
            tracing::error!(%error, "metrics encoding failed");
            String::new()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_correlation_prefers_explicit_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("corr-1"));
        headers.insert("ce-id", HeaderValue::from_static("event-1"));
        assert_eq!(correlation_id_from(Some("event-2"), &headers), "corr-1");
    }

    #[test]
    fn test_correlation_falls_back_to_event_id() {
        let mut headers = HeaderMap::new();
        headers.insert("ce-id", HeaderValue::from_static("event-1"));
        assert_eq!(correlation_id_from(None, &headers), "event-1");

        let headers = HeaderMap::new();
        assert_eq!(correlation_id_from(Some("event-2"), &headers), "event-2");
    }

    #[test]
    fn test_correlation_from_traceparent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            HeaderValue::from_static("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"),
        );
        assert_eq!(
            correlation_id_from(None, &headers),
            "0af7651916cd43dd8448eb211c80319c"
        );
    }

    #[test]
    fn test_correlation_generates_uuid_when_nothing_present() {
        let headers = HeaderMap::new();
        let id = correlation_id_from(None, &headers);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_traceparent_for_uuid_correlation() {
        let id = Uuid::new_v4().to_string();
        let traceparent = traceparent_for(&id).unwrap();
        let parts: Vec<&str> = traceparent.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);

        assert!(traceparent_for("not-a-trace-id").is_none());
    }

    #[test]
    fn test_guard_records_without_panicking() {
        let mut guard = RemediationGuard::new("PodCrashLooping", "pod-restart");
        guard.succeed();
        drop(guard);

        // Failed attempt path.
        let guard = RemediationGuard::new("PodCrashLooping", "pod-restart");
        drop(guard);

        assert!(gather_metrics().contains("agent_sre_remediation_attempts_total"));
    }
}
