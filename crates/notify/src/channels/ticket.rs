//! Ticket webhook notification channel.
//!
//! Posts remediation events to an issue-tracker webhook so terminal
//! failures raise a ticket an operator can pick up. The payload is a flat
//! JSON document; the receiving side maps it onto its tracker of choice.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Environment variable for the ticket webhook URL.
const ENV_TICKET_WEBHOOK_URL: &str = "TICKET_WEBHOOK_URL";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Ticket payload posted to the webhook.
#[derive(Debug, Serialize)]
struct TicketPayload {
    title: String,
    severity: &'static str,
    correlation_id: String,
    fields: HashMap<String, String>,
    timestamp: String,
}

/// Ticket webhook notification channel.
pub struct TicketChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl TicketChannel {
    /// Create a new ticket channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_TICKET_WEBHOOK_URL).ok();

        if webhook_url.is_some() {
            debug!("ticket notifications enabled");
        } else {
            debug!("ticket notifications disabled (TICKET_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a ticket channel with a specific webhook URL.
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url: Some(webhook_url),
            client: reqwest::Client::new(),
        }
    }

    fn format_payload(event: &NotifyEvent) -> TicketPayload {
        TicketPayload {
            title: event.title(),
            severity: event.severity().as_str(),
            correlation_id: event.correlation_id().to_string(),
            fields: event.fields(),
            timestamp: event.timestamp().to_rfc3339(),
        }
    }
}

#[async_trait]
impl NotifyChannel for TicketChannel {
    fn name(&self) -> &'static str {
        "ticket"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let Some(webhook_url) = &self.webhook_url else {
            return Err(ChannelError::NotConfigured(
                "TICKET_WEBHOOK_URL not set".to_string(),
            ));
        };

        let payload = Self::format_payload(event);
        self.client
            .post(webhook_url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_disabled_without_url() {
        let channel = TicketChannel {
            webhook_url: None,
            client: reqwest::Client::new(),
        };
        assert!(!channel.enabled());
    }

    #[tokio::test]
    async fn test_send_posts_ticket() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "severity": "Critical",
                "correlation_id": "corr-9"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TicketChannel::new(server.uri());
        let event = NotifyEvent::CannotFix {
            alertname: "FluxReconciliationFailure".to_string(),
            lambda_function: "flux-reconcile-kustomization".to_string(),
            correlation_id: "corr-9".to_string(),
            reason: "connection refused".to_string(),
            timestamp: Utc::now(),
        };
        channel.send(&event).await.unwrap();
    }
}
