//! Error taxonomy for the remediation agent.
//!
//! Expected failures cross component boundaries as tagged values. The
//! workflow engine translates them into step outcomes; only programming
//! bugs unwind.

use thiserror::Error;

/// Tagged error kinds for the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Network failure talking to stores, LLMs, or lambdas. Retried on
    /// idempotent operations, surfaced after the retry budget.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed CloudEvent, LLM output, or approval callback. Never
    /// retried; the caller gets a 400.
    #[error("parse error: {0}")]
    Parse(String),

    /// Approval rejected or scope-violating request. Terminal.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// Remediation target failed its health probe. Terminal, `cannot_fix`.
    #[error("remediation target unavailable: {0}")]
    Unavailable(String),

    /// Workflow logic violation (missing selection, missing labels).
    #[error("workflow error: {0}")]
    Workflow(String),

    /// Memory subsystem failure.
    #[error("memory error: {0}")]
    Memory(#[from] agent_memory::MemoryError),
}

impl AgentError {
    /// Stable kind label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
            Self::Authorization(_) => "authorization",
            Self::Unavailable(_) => "unavailable",
            Self::Workflow(_) => "workflow",
            Self::Memory(_) => "memory",
        }
    }
}

/// Truncate an offending payload for logging. Parse failures log the
/// payload capped at 500 chars.
#[must_use]
pub fn truncate_payload(payload: &str) -> String {
    payload.chars().take(500).collect()
}
