//! Approval requests for supervised remediation.
//!
//! The [`ApprovalManager`] fans a request out to its configured providers,
//! tracks per-provider decisions, derives the global status from the
//! request's quorum rule, and sweeps pending requests past their timeout.
//!
//! # Usage
//!
//! ```no_run
//! use approvals::{ApprovalManager, ApprovalRequest, ApprovalProvider};
//!
//! # async fn run() {
//! let manager = ApprovalManager::from_env();
//! let request = ApprovalRequest::new(
//!     "agent-sre",
//!     "execute_lambda_function",
//!     vec![ApprovalProvider::Slack],
//! );
//! let stored = manager.request_approval(request).await;
//! println!("request {} is {:?}", stored.request_id, stored.status);
//! # }
//! ```
//!
//! # Configuration
//!
//! - `APPROVAL_WEBHOOK_URL` enables the chat provider
//! - `APPROVAL_CHANNEL` chat channel (default `#agent-approvals`)
//! - `APPROVAL_HTTP_ENDPOINT` enables the custom HTTP provider
//! - `APPROVAL_CALLBACK_URL` callback advertised to providers

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod providers;
pub mod types;

pub use error::ApprovalError;
pub use providers::chat::ChatWebhookProvider;
pub use providers::http::HttpApprovalProvider;
pub use providers::ApprovalChannel;
pub use types::{
    ApprovalDecision, ApprovalProvider, ApprovalRequest, ApprovalStatus, TimeoutAction,
};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Manages approval requests across providers.
///
/// The in-memory request map is the source of truth for a request's
/// lifetime; response handling is serialized per manager so concurrent
/// provider decisions cannot interleave updates.
pub struct ApprovalManager {
    channels: HashMap<ApprovalProvider, Arc<dyn ApprovalChannel>>,
    requests: RwLock<HashMap<String, ApprovalRequest>>,
}

impl ApprovalManager {
    /// Create a manager with explicit channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn ApprovalChannel>>) -> Self {
        let channels = channels
            .into_iter()
            .map(|channel| (channel.provider(), channel))
            .collect();
        Self {
            channels,
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Auto-detect configured providers from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut channels: Vec<Arc<dyn ApprovalChannel>> = Vec::new();

        if let Ok(webhook_url) = std::env::var("APPROVAL_WEBHOOK_URL") {
            let channel = std::env::var("APPROVAL_CHANNEL").ok();
            let callback = std::env::var("APPROVAL_CALLBACK_URL").ok();
            channels.push(Arc::new(ChatWebhookProvider::new(
                &webhook_url,
                channel.as_deref(),
                callback.as_deref(),
            )));
            info!("chat approval provider enabled");
        }

        if let Ok(endpoint) = std::env::var("APPROVAL_HTTP_ENDPOINT") {
            let callback = std::env::var("APPROVAL_CALLBACK_URL").ok();
            channels.push(Arc::new(HttpApprovalProvider::new(
                &endpoint,
                callback.as_deref(),
            )));
            info!("custom HTTP approval provider enabled");
        }

        if channels.is_empty() {
            warn!("no approval providers configured");
        }

        Self::with_channels(channels)
    }

    /// Providers this manager can reach.
    #[must_use]
    pub fn configured_providers(&self) -> Vec<ApprovalProvider> {
        self.channels.keys().copied().collect()
    }

    /// Store a request and send it to each of its providers. A provider
    /// send failure marks that provider rejected (fail-closed); the global
    /// status is derived afterwards.
    pub async fn request_approval(&self, mut request: ApprovalRequest) -> ApprovalRequest {
        for provider in request.providers.clone() {
            match self.channels.get(&provider) {
                Some(channel) => match channel.send(&request).await {
                    Ok(handle) => {
                        request.approvals.insert(provider, ApprovalStatus::Pending);
                        request
                            .metadata
                            .insert(provider.as_str().to_string(), handle);
                    }
                    Err(err) => {
                        error!(
                            request_id = %request.request_id,
                            provider = provider.as_str(),
                            error = %err,
                            "approval request send failed"
                        );
                        request.approvals.insert(provider, ApprovalStatus::Rejected);
                    }
                },
                None => {
                    error!(
                        request_id = %request.request_id,
                        provider = provider.as_str(),
                        "approval provider not configured"
                    );
                    request.approvals.insert(provider, ApprovalStatus::Rejected);
                }
            }
        }

        derive_status(&mut request);

        let stored = request.clone();
        self.requests
            .write()
            .await
            .insert(request.request_id.clone(), request);

        info!(
            request_id = %stored.request_id,
            providers = stored.providers.len(),
            status = ?stored.status,
            "approval requested"
        );
        stored
    }

    /// Apply a provider decision and re-derive the global status. Returns
    /// the updated request, or `None` when the request is unknown.
    pub async fn handle_response(&self, decision: &ApprovalDecision) -> Option<ApprovalRequest> {
        let mut requests = self.requests.write().await;
        let request = match requests.get_mut(&decision.request_id) {
            Some(request) => request,
            None => {
                warn!(request_id = %decision.request_id, "approval request not found");
                return None;
            }
        };

        let status = if decision.approved() {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        request.approvals.insert(decision.provider, status);
        derive_status(request);

        info!(
            request_id = %request.request_id,
            provider = decision.provider.as_str(),
            decision = %decision.decision,
            status = ?request.status,
            "approval response processed"
        );

        Some(request.clone())
    }

    /// Look up a stored request.
    pub async fn get_request(&self, request_id: &str) -> Option<ApprovalRequest> {
        self.requests.read().await.get(request_id).cloned()
    }

    /// Transition expired pending requests to `timeout` and apply their
    /// timeout action. Returns the requests that timed out in this pass.
    pub async fn check_timeouts(&self) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        let mut timed_out = Vec::new();

        let mut requests = self.requests.write().await;
        for request in requests.values_mut() {
            if request.status != ApprovalStatus::Pending || !request.is_expired(now) {
                continue;
            }

            request.status = match request.timeout_action {
                TimeoutAction::Approve => ApprovalStatus::Approved,
                TimeoutAction::Reject => ApprovalStatus::Rejected,
                TimeoutAction::Pending => ApprovalStatus::Timeout,
            };

            warn!(
                request_id = %request.request_id,
                action = ?request.timeout_action,
                status = ?request.status,
                "approval request timed out"
            );
            timed_out.push(request.clone());
        }

        timed_out
    }

    /// Spawn the periodic timeout sweep. The task runs until the process
    /// shuts down.
    pub fn spawn_timeout_sweep(self: &Arc<Self>, interval: Duration) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let timed_out = manager.check_timeouts().await;
                if !timed_out.is_empty() {
                    info!(count = timed_out.len(), "approval timeout sweep");
                }
            }
        });
    }
}

/// Derive the global status from per-provider statuses under the request's
/// quorum rule. Terminal statuses are never downgraded.
fn derive_status(request: &mut ApprovalRequest) {
    if request.status != ApprovalStatus::Pending {
        return;
    }
    if request.approvals.is_empty() {
        return;
    }

    let any_approved = request
        .approvals
        .values()
        .any(|s| *s == ApprovalStatus::Approved);
    let any_rejected = request
        .approvals
        .values()
        .any(|s| *s == ApprovalStatus::Rejected);
    let all_approved = request
        .approvals
        .values()
        .all(|s| *s == ApprovalStatus::Approved);
    let all_rejected = request
        .approvals
        .values()
        .all(|s| *s == ApprovalStatus::Rejected);

    if request.require_all {
        if any_rejected {
            request.status = ApprovalStatus::Rejected;
        } else if all_approved && request.approvals.len() == request.providers.len() {
            request.status = ApprovalStatus::Approved;
        }
    } else if any_approved {
        request.status = ApprovalStatus::Approved;
    } else if all_rejected && request.approvals.len() == request.providers.len() {
        request.status = ApprovalStatus::Rejected;
    }
}
