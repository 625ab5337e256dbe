//! Chat webhook approval provider.
//!
//! Posts an interactive message with approve/reject actions to a chat
//! webhook. Interactive responses come back either through the chat app's
//! interaction payload (normalized by [`ChatWebhookProvider::parse_interaction`])
//! or through the agent's `/approval/callback` endpoint directly.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use super::ApprovalChannel;
use crate::error::ApprovalError;
use crate::types::{ApprovalDecision, ApprovalProvider, ApprovalRequest};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CHANNEL: &str = "#agent-approvals";

/// Webhook-based chat approval provider.
pub struct ChatWebhookProvider {
    webhook_url: String,
    channel: String,
    callback_url: Option<String>,
    client: reqwest::Client,
}

impl ChatWebhookProvider {
    #[must_use]
    pub fn new(webhook_url: &str, channel: Option<&str>, callback_url: Option<&str>) -> Self {
        Self {
            webhook_url: webhook_url.to_string(),
            channel: channel.unwrap_or(DEFAULT_CHANNEL).to_string(),
            callback_url: callback_url.map(ToString::to_string),
            client: reqwest::Client::new(),
        }
    }

    /// Build the interactive message payload for a request.
    fn build_message(&self, request: &ApprovalRequest) -> Value {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("Approval Required: {}", request.action)
                }
            }),
            json!({
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Agent:* {}", request.agent_name) },
                    { "type": "mrkdwn", "text": format!("*Request ID:* `{}`", request.request_id) },
                    { "type": "mrkdwn", "text": format!("*Action:* {}", request.action) },
                    { "type": "mrkdwn", "text": format!("*Alert:* {}", request.alertname.as_deref().unwrap_or("N/A")) }
                ]
            }),
        ];

        if let Some(lambda_function) = &request.lambda_function {
            let parameters =
                serde_json::to_string_pretty(&request.parameters).unwrap_or_default();
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("*Function:* `{lambda_function}`\n*Parameters:* ```{parameters}```")
                }
            }));
        }

        blocks.push(json!({
            "type": "actions",
            "elements": [
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Approve" },
                    "style": "primary",
                    "action_id": format!("approve_{}", request.request_id),
                    "value": json!({ "request_id": request.request_id, "action": "approve" }).to_string()
                },
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Reject" },
                    "style": "danger",
                    "action_id": format!("reject_{}", request.request_id),
                    "value": json!({ "request_id": request.request_id, "action": "reject" }).to_string()
                }
            ]
        }));

        let timeout_minutes = request.timeout_seconds / 60;
        blocks.push(json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "Request will timeout in {timeout_minutes} minutes. Default action: {:?}",
                    request.timeout_action
                )
            }]
        }));

        json!({
            "channel": self.channel,
            "blocks": blocks,
            "text": format!("Approval required for {}: {}", request.agent_name, request.action),
            "callback_url": self.callback_url,
        })
    }

    /// Normalize a chat interaction payload into an [`ApprovalDecision`].
    ///
    /// Expects a `block_actions` payload whose first action carries an
    /// `action_id` of the form `approve_<request_id>` or
    /// `reject_<request_id>`.
    pub fn parse_interaction(payload: &Value) -> Result<ApprovalDecision, ApprovalError> {
        if payload.get("type").and_then(Value::as_str) != Some("block_actions") {
            return Err(ApprovalError::MalformedPayload(
                "not a block_actions payload".to_string(),
            ));
        }

        let action_id = payload
            .get("actions")
            .and_then(Value::as_array)
            .and_then(|actions| actions.first())
            .and_then(|action| action.get("action_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ApprovalError::MalformedPayload("no actions".to_string()))?;

        let (decision, request_id) = if let Some(id) = action_id.strip_prefix("approve_") {
            ("approve", id)
        } else if let Some(id) = action_id.strip_prefix("reject_") {
            ("reject", id)
        } else {
            return Err(ApprovalError::MalformedPayload(format!(
                "unknown action_id: {action_id}"
            )));
        };

        let user = payload.get("user").cloned().unwrap_or_default();
        Ok(ApprovalDecision {
            request_id: request_id.to_string(),
            provider: ApprovalProvider::Slack,
            decision: decision.to_string(),
            user_id: user.get("id").and_then(Value::as_str).map(ToString::to_string),
            user_name: user
                .get("name")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            timestamp: Some(Utc::now()),
        })
    }
}

#[async_trait]
impl ApprovalChannel for ChatWebhookProvider {
    fn provider(&self) -> ApprovalProvider {
        ApprovalProvider::Slack
    }

    async fn send(&self, request: &ApprovalRequest) -> Result<Value, ApprovalError> {
        let payload = self.build_message(request);

        let response = self
            .client
            .post(&self.webhook_url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await.unwrap_or_default();

        tracing::info!(
            request_id = %request.request_id,
            channel = %self.channel,
            "chat approval request sent"
        );

        Ok(json!({
            "provider": "slack",
            "message_ts": body.get("ts"),
            "channel": self.channel,
            "status": "sent",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApprovalRequest {
        let mut parameters = std::collections::HashMap::new();
        parameters.insert("name".to_string(), json!("homepage"));
        ApprovalRequest::new(
            "agent-sre",
            "execute_lambda_function",
            vec![ApprovalProvider::Slack],
        )
        .with_lambda("flux-reconcile-kustomization", parameters)
        .with_alert("FluxReconciliationFailure", "corr-1")
    }

    #[test]
    fn test_message_carries_actions_and_request_id() {
        let provider = ChatWebhookProvider::new("https://hooks.example/x", None, None);
        let message = provider.build_message(&request());

        let blocks = message["blocks"].as_array().unwrap();
        let actions = blocks
            .iter()
            .find(|b| b["type"] == "actions")
            .expect("actions block");
        let ids: Vec<&str> = actions["elements"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action_id"].as_str().unwrap())
            .collect();
        assert!(ids[0].starts_with("approve_"));
        assert!(ids[1].starts_with("reject_"));
        assert!(message["text"].as_str().unwrap().contains("agent-sre"));
    }

    #[test]
    fn test_parse_interaction() {
        let payload = json!({
            "type": "block_actions",
            "actions": [{ "action_id": "approve_req-42", "value": "{}" }],
            "user": { "id": "U1", "name": "oncall" }
        });
        let decision = ChatWebhookProvider::parse_interaction(&payload).unwrap();
        assert_eq!(decision.request_id, "req-42");
        assert!(decision.approved());
        assert_eq!(decision.user_name.as_deref(), Some("oncall"));
    }

    #[test]
    fn test_parse_interaction_rejects_other_payloads() {
        let payload = json!({ "type": "view_submission" });
        assert!(ChatWebhookProvider::parse_interaction(&payload).is_err());
    }
}
