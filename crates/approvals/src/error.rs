//! Error types for the approval system.

use thiserror::Error;

/// Errors that can occur when requesting or resolving approvals.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// HTTP request to a provider failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider is not configured
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Callback referenced an unknown request
    #[error("Approval request not found: {0}")]
    RequestNotFound(String),

    /// Malformed provider payload
    #[error("Malformed approval payload: {0}")]
    MalformedPayload(String),
}
