//! Generic HTTP approval provider.
//!
//! POSTs the approval request as JSON to a configured endpoint. The
//! endpoint replies with an `approval_id`; decisions arrive either via the
//! agent's `/approval/callback` webhook or by polling
//! `{endpoint}/status/{approval_id}`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::ApprovalChannel;
use crate::error::ApprovalError;
use crate::types::{ApprovalProvider, ApprovalRequest};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Custom HTTP POST approval provider.
pub struct HttpApprovalProvider {
    endpoint: String,
    headers: HashMap<String, String>,
    callback_url: Option<String>,
    client: reqwest::Client,
}

impl HttpApprovalProvider {
    #[must_use]
    pub fn new(endpoint: &str, callback_url: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            headers: HashMap::new(),
            callback_url: callback_url.map(ToString::to_string),
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.headers
            .insert("Authorization".to_string(), format!("Bearer {token}"));
        self
    }

    /// Poll the provider for a decision on a previously sent request.
    pub async fn check_status(&self, approval_id: &str) -> Result<Value, ApprovalError> {
        let url = format!("{}/status/{approval_id}", self.endpoint);
        let mut builder = self.client.get(&url).timeout(POLL_TIMEOUT);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ApprovalChannel for HttpApprovalProvider {
    fn provider(&self) -> ApprovalProvider {
        ApprovalProvider::Custom
    }

    async fn send(&self, request: &ApprovalRequest) -> Result<Value, ApprovalError> {
        let payload = json!({
            "request_id": request.request_id,
            "agent_name": request.agent_name,
            "action": request.action,
            "lambda_function": request.lambda_function,
            "parameters": request.parameters,
            "alertname": request.alertname,
            "correlation_id": request.correlation_id,
            "timeout": request.timeout_seconds,
            "callback_url": self.callback_url,
            "metadata": request.metadata,
        });

        let mut builder = self.client.post(&self.endpoint).timeout(SEND_TIMEOUT);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }

        let response = builder.json(&payload).send().await?.error_for_status()?;
        let body: Value = response.json().await.unwrap_or_default();

        tracing::info!(
            request_id = %request.request_id,
            endpoint = %self.endpoint,
            approval_id = body.get("approval_id").and_then(serde_json::Value::as_str),
            "custom approval request sent"
        );

        Ok(json!({
            "provider": "custom",
            "approval_id": body.get("approval_id"),
            "status_url": body.get("status_url"),
            "status": "sent",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_request_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({ "agent_name": "agent-sre" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "approval_id": "ap-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpApprovalProvider::new(&server.uri(), None);
        let request = ApprovalRequest::new(
            "agent-sre",
            "execute_lambda_function",
            vec![ApprovalProvider::Custom],
        );
        let handle = provider.send(&request).await.unwrap();
        assert_eq!(handle["approval_id"], "ap-1");
        assert_eq!(handle["status"], "sent");
    }

    #[tokio::test]
    async fn test_send_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = HttpApprovalProvider::new(&server.uri(), None);
        let request = ApprovalRequest::new(
            "agent-sre",
            "execute_lambda_function",
            vec![ApprovalProvider::Custom],
        );
        assert!(provider.send(&request).await.is_err());
    }
}
