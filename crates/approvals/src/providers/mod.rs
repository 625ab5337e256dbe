//! Approval provider implementations.

pub mod chat;
pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApprovalError;
use crate::types::{ApprovalProvider, ApprovalRequest};

/// Trait for approval providers (chat webhook, custom HTTP app, ...).
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Which provider slot this channel fills.
    fn provider(&self) -> ApprovalProvider;

    /// Send an approval request to this provider. Returns provider-specific
    /// handle metadata (message timestamp, approval id, ...).
    async fn send(&self, request: &ApprovalRequest) -> Result<Value, ApprovalError>;
}
