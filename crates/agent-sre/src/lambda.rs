//! Lambda function invoker.
//!
//! A "lambda function" here is a remote HTTP remediation endpoint inside
//! the cluster, exposing `/health` for liveness and `/` for
//! CloudEvent-formatted invocation. The invoker probes availability
//! before every call; an unreachable target is terminal and tagged
//! `cannot_fix` so the workflow never retries it.
//!
//! Invocations are at-least-once: a timed-out call only stops waiting,
//! the lambda itself may still complete. Remediations must be idempotent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, Instrument};

use crate::cloudevent::{CloudEvent, REMEDIATION_REQUEST};
use crate::observability;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const INVOKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of an availability probe.
#[derive(Debug, Clone)]
pub struct Availability {
    pub available: bool,
    pub reason: String,
}

/// Parsed result of a lambda invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    /// "success" or "error"
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The target failed its health probe; remediation is impossible.
    #[serde(default)]
    pub cannot_fix: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub correlation_id: String,
    /// Raw response payload for diagnostics.
    #[serde(default)]
    pub raw: Value,
}

impl InvocationResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    fn transport_error(message: &str, correlation_id: &str, http_status: Option<u16>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
            error: Some(message.to_string()),
            cannot_fix: false,
            http_status,
            correlation_id: correlation_id.to_string(),
            raw: Value::Null,
        }
    }
}

/// Calls remediation lambda endpoints.
pub struct LambdaInvoker {
    namespace: String,
    base_url_override: Option<String>,
    client: reqwest::Client,
}

impl LambdaInvoker {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            base_url_override: None,
            client: reqwest::Client::new(),
        }
    }

    /// Route every function to a fixed base URL instead of cluster-local
    /// service DNS. For tests and port-forward debugging.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url_override = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    fn service_url(&self, function_name: &str) -> String {
        self.base_url_override.clone().unwrap_or_else(|| {
            format!(
                "http://{function_name}.{}.svc.cluster.local",
                self.namespace
            )
        })
    }

    /// Probe `/health` with a 5s budget.
    pub async fn check_availability(&self, function_name: &str) -> Availability {
        let url = format!("{}/health", self.service_url(function_name));

        match self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Availability {
                available: true,
                reason: "Service is ready".to_string(),
            },
            Ok(response) => Availability {
                available: false,
                reason: format!("Service returned HTTP {}", response.status().as_u16()),
            },
            Err(err) if err.is_timeout() => Availability {
                available: false,
                reason: "Service health check timed out".to_string(),
            },
            Err(err) if err.is_connect() => Availability {
                available: false,
                reason: "Service is not reachable (connection error)".to_string(),
            },
            Err(err) => Availability {
                available: false,
                reason: format!("Service check failed: {err}"),
            },
        }
    }

    /// Invoke a lambda function with a CloudEvent envelope.
    ///
    /// An unavailable target short-circuits with `cannot_fix = true` and
    /// no invocation attempt. Transport failures surface as error results,
    /// never as panics or unwinding errors.
    pub async fn invoke(
        &self,
        function_name: &str,
        parameters: &HashMap<String, Value>,
        correlation_id: &str,
    ) -> InvocationResult {
        let url = format!("{}/", self.service_url(function_name));

        let availability = self.check_availability(function_name).await;
        if !availability.available {
            error!(
                function_name,
                namespace = %self.namespace,
                correlation_id,
                reason = %availability.reason,
                cannot_fix = true,
                "lambda function unavailable"
            );
            return InvocationResult {
                status: "error".to_string(),
                message: format!("LambdaFunction {function_name} is not available"),
                error: Some(availability.reason),
                cannot_fix: true,
                http_status: None,
                correlation_id: correlation_id.to_string(),
                raw: Value::Null,
            };
        }

        let span = tracing::info_span!(
            "lambda_function.call",
            lambda_function = function_name,
            namespace = %self.namespace,
            url = %url,
            event_id = correlation_id,
            event_type = REMEDIATION_REQUEST,
        );

        async {
            let event = CloudEvent::new(
                REMEDIATION_REQUEST,
                "agent-sre",
                correlation_id,
                serde_json::to_value(parameters).unwrap_or_default(),
            )
            .with_correlation_id(correlation_id);

            let mut request = self
                .client
                .post(&url)
                .timeout(INVOKE_TIMEOUT)
                .header("X-Correlation-ID", correlation_id)
                .json(&event.data);
            for (name, value) in event.binary_headers() {
                // .json() already set the content type.
                if name != "content-type" {
                    request = request.header(name, value);
                }
            }
            if let Some(traceparent) = observability::traceparent_for(correlation_id) {
                request = request.header("traceparent", traceparent);
            }

            info!(function_name, correlation_id, "calling lambda function");

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    error!(function_name, correlation_id, error = %err, "lambda transport error");
                    return InvocationResult::transport_error(
                        &format!("Unexpected error: {err}"),
                        correlation_id,
                        None,
                    );
                }
            };

            let http_status = response.status().as_u16();
            if !response.status().is_success() {
                error!(function_name, correlation_id, http_status, "lambda HTTP error");
                return InvocationResult::transport_error(
                    &format!("HTTP error: {http_status}"),
                    correlation_id,
                    Some(http_status),
                );
            }

            let raw: Value = response.json().await.unwrap_or(Value::Null);
            let data = extract_event_data(&raw);

            let status = data
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            info!(
                function_name,
                status = %status,
                message = %message,
                correlation_id,
                http_status,
                "lambda function completed"
            );

            InvocationResult {
                status,
                message,
                error: data
                    .get("error")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                cannot_fix: false,
                http_status: Some(http_status),
                correlation_id: correlation_id.to_string(),
                raw,
            }
        }
        .instrument(span)
        .await
    }
}

/// Lambda responses may arrive as a structured CloudEvent or as a bare
/// JSON payload; surface the inner data either way.
fn extract_event_data(raw: &Value) -> Value {
    if raw.get("specversion").is_some() {
        raw.get("data").cloned().unwrap_or(Value::Null)
    } else {
        raw.clone()
    }
}
