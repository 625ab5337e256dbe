//! Approval request model and lifecycle types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle status of an approval request, globally or per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Timeout,
    Cancelled,
}

/// Supported approval providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalProvider {
    /// Chat webhook (interactive message with approve/reject actions).
    Slack,
    /// Generic HTTP endpoint.
    Custom,
}

impl ApprovalProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Custom => "custom",
        }
    }
}

/// What to do when a pending request exceeds its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    Approve,
    Reject,
    /// Leave the request in `timeout`; the caller treats it as a failure.
    #[default]
    Pending,
}

/// A single approval request fanned out to one or more providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub agent_name: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda_function: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub providers: Vec<ApprovalProvider>,
    pub require_all: bool,
    pub timeout_seconds: u64,
    pub timeout_action: TimeoutAction,
    pub created_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    /// Per-provider status; quorum is derived from these.
    #[serde(default)]
    pub approvals: HashMap<ApprovalProvider, ApprovalStatus>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ApprovalRequest {
    #[must_use]
    pub fn new(agent_name: &str, action: &str, providers: Vec<ApprovalProvider>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            agent_name: agent_name.to_string(),
            action: action.to_string(),
            lambda_function: None,
            parameters: HashMap::new(),
            alertname: None,
            correlation_id: None,
            providers,
            require_all: false,
            timeout_seconds: 3_600,
            timeout_action: TimeoutAction::default(),
            created_at: Utc::now(),
            status: ApprovalStatus::Pending,
            approvals: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_lambda(mut self, lambda_function: &str, parameters: HashMap<String, Value>) -> Self {
        self.lambda_function = Some(lambda_function.to_string());
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_alert(mut self, alertname: &str, correlation_id: &str) -> Self {
        self.alertname = Some(alertname.to_string());
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout_seconds: u64, action: TimeoutAction) -> Self {
        self.timeout_seconds = timeout_seconds;
        self.timeout_action = action;
        self
    }

    #[must_use]
    pub fn with_require_all(mut self, require_all: bool) -> Self {
        self.require_all = require_all;
        self
    }

    /// Whether the request has outlived its timeout window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.created_at
            + Duration::seconds(i64::try_from(self.timeout_seconds).unwrap_or(i64::MAX));
        now >= deadline
    }
}

/// Normalized approval response, as delivered to `/approval/callback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub request_id: String,
    pub provider: ApprovalProvider,
    /// "approve" or "reject".
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ApprovalDecision {
    #[must_use]
    pub fn approved(&self) -> bool {
        self.decision == "approve"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serialization_matches_callback_contract() {
        assert_eq!(
            serde_json::to_string(&ApprovalProvider::Slack).unwrap(),
            "\"slack\""
        );
        assert_eq!(
            serde_json::to_string(&ApprovalProvider::Custom).unwrap(),
            "\"custom\""
        );
    }

    #[test]
    fn test_expiry() {
        let request = ApprovalRequest::new("agent-sre", "execute_lambda_function", vec![])
            .with_timeout(60, TimeoutAction::Reject);
        assert!(!request.is_expired(request.created_at + Duration::seconds(59)));
        assert!(request.is_expired(request.created_at + Duration::seconds(60)));
    }

    #[test]
    fn test_decision_parse() {
        let body = r#"{
            "request_id": "abc",
            "provider": "slack",
            "decision": "approve",
            "user_id": "U1",
            "user_name": "oncall",
            "timestamp": "2025-01-01T00:00:00Z"
        }"#;
        let decision: ApprovalDecision = serde_json::from_str(body).unwrap();
        assert!(decision.approved());
        assert_eq!(decision.provider, ApprovalProvider::Slack);
    }
}
