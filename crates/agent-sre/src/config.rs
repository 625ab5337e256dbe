//! Configuration for the SRE agent.

use approvals::TimeoutAction;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Whether remediations execute directly or behind a human approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    #[default]
    Agentic,
    Supervised,
}

impl OperationMode {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("supervised") {
            Self::Supervised
        } else {
            Self::Agentic
        }
    }
}

/// SRE agent configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// `supervised` inserts the approval step into the workflow.
    pub operation_mode: OperationMode,
    /// Quorum rule for approvals.
    pub approval_require_all: bool,
    /// Pending approvals transition to timeout after this many seconds.
    pub approval_timeout_seconds: u64,
    /// What to do when an approval times out.
    pub approval_timeout_action: TimeoutAction,
    /// Lambda retry budget per workflow.
    pub max_retries: u32,
    /// Overall workflow deadline.
    pub workflow_budget: Duration,
    /// Namespace lambda services resolve in.
    pub lambda_namespace: String,
    /// Recursive-reasoning phase is attempted when this path is readable.
    pub trm_model_path: Option<PathBuf>,
    /// Recursive reasoner inference endpoint.
    pub reasoner_url: String,
    /// Function-calling LLM endpoint. Phase 3 is skipped when unset.
    pub llm_url: Option<String>,
    /// Example database file.
    pub example_db_path: PathBuf,
}

impl AgentConfig {
    /// Create config from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            operation_mode: std::env::var("OPERATION_MODE")
                .map(|v| OperationMode::parse(&v))
                .unwrap_or_default(),
            approval_require_all: env_bool("APPROVAL_REQUIRE_ALL", false),
            approval_timeout_seconds: env_u64("APPROVAL_TIMEOUT_SECONDS", 3_600),
            approval_timeout_action: std::env::var("APPROVAL_TIMEOUT_ACTION")
                .map(|v| parse_timeout_action(&v))
                .unwrap_or_default(),
            max_retries: u32::try_from(env_u64("MAX_RETRIES", 3)).unwrap_or(3),
            workflow_budget: Duration::from_secs(env_u64("WORKFLOW_BUDGET_SECONDS", 300)),
            lambda_namespace: std::env::var("LAMBDA_NAMESPACE")
                .unwrap_or_else(|_| "ai".to_string()),
            trm_model_path: std::env::var("TRM_MODEL_PATH").ok().map(PathBuf::from),
            reasoner_url: std::env::var("REASONER_URL")
                .unwrap_or_else(|_| "http://trm-reasoning.ml-platform.svc:8080".to_string()),
            llm_url: std::env::var("LLM_URL").ok(),
            example_db_path: std::env::var("EXAMPLE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/remediation_examples.json")),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::Agentic,
            approval_require_all: false,
            approval_timeout_seconds: 3_600,
            approval_timeout_action: TimeoutAction::Pending,
            max_retries: 3,
            workflow_budget: Duration::from_secs(300),
            lambda_namespace: "ai".to_string(),
            trm_model_path: None,
            reasoner_url: "http://trm-reasoning.ml-platform.svc:8080".to_string(),
            llm_url: None,
            example_db_path: PathBuf::from("data/remediation_examples.json"),
        }
    }
}

fn parse_timeout_action(value: &str) -> TimeoutAction {
    match value.to_ascii_lowercase().as_str() {
        "approve" => TimeoutAction::Approve,
        "reject" => TimeoutAction::Reject,
        _ => TimeoutAction::Pending,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.operation_mode, OperationMode::Agentic);
        assert!(!config.approval_require_all);
        assert_eq!(config.approval_timeout_seconds, 3_600);
        assert_eq!(config.approval_timeout_action, TimeoutAction::Pending);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.lambda_namespace, "ai");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(OperationMode::parse("supervised"), OperationMode::Supervised);
        assert_eq!(OperationMode::parse("SUPERVISED"), OperationMode::Supervised);
        assert_eq!(OperationMode::parse("agentic"), OperationMode::Agentic);
        assert_eq!(OperationMode::parse("bogus"), OperationMode::Agentic);
    }

    #[test]
    fn test_timeout_action_parse() {
        assert_eq!(parse_timeout_action("approve"), TimeoutAction::Approve);
        assert_eq!(parse_timeout_action("REJECT"), TimeoutAction::Reject);
        assert_eq!(parse_timeout_action("other"), TimeoutAction::Pending);
    }
}
