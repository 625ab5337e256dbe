//! Notification event types for the remediation agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity levels for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// A remediation completed successfully
    RemediationCompleted {
        alertname: String,
        lambda_function: String,
        correlation_id: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A remediation failed terminally
    RemediationFailed {
        alertname: String,
        lambda_function: Option<String>,
        correlation_id: String,
        error: String,
        retry_count: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A remediation target was unreachable; no automatic fix is possible
    CannotFix {
        alertname: String,
        lambda_function: String,
        correlation_id: String,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// An approval request is waiting on an operator
    ApprovalPending {
        alertname: String,
        lambda_function: String,
        request_id: String,
        correlation_id: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Short title for the event.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::RemediationCompleted { alertname, .. } => {
                format!("Remediation Completed: {alertname}")
            }
            Self::RemediationFailed { alertname, .. } => {
                format!("Remediation Failed: {alertname}")
            }
            Self::CannotFix { alertname, .. } => format!("Cannot Fix: {alertname}"),
            Self::ApprovalPending { alertname, .. } => {
                format!("Approval Pending: {alertname}")
            }
        }
    }

    /// Severity used for routing and formatting.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::RemediationCompleted { .. } => Severity::Info,
            Self::ApprovalPending { .. } => Severity::Warning,
            Self::RemediationFailed { .. } | Self::CannotFix { .. } => Severity::Critical,
        }
    }

    /// Correlation ID for the causal chain this event belongs to.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        match self {
            Self::RemediationCompleted { correlation_id, .. }
            | Self::RemediationFailed { correlation_id, .. }
            | Self::CannotFix { correlation_id, .. }
            | Self::ApprovalPending { correlation_id, .. } => correlation_id,
        }
    }

    /// Event timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RemediationCompleted { timestamp, .. }
            | Self::RemediationFailed { timestamp, .. }
            | Self::CannotFix { timestamp, .. }
            | Self::ApprovalPending { timestamp, .. } => *timestamp,
        }
    }

    /// Flatten event details into ticket fields.
    #[must_use]
    pub fn fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("correlation_id".to_string(), self.correlation_id().to_string());
        match self {
            Self::RemediationCompleted {
                alertname,
                lambda_function,
                ..
            } => {
                fields.insert("alertname".to_string(), alertname.clone());
                fields.insert("lambda_function".to_string(), lambda_function.clone());
            }
            Self::RemediationFailed {
                alertname,
                lambda_function,
                error,
                retry_count,
                ..
            } => {
                fields.insert("alertname".to_string(), alertname.clone());
                if let Some(lambda_function) = lambda_function {
                    fields.insert("lambda_function".to_string(), lambda_function.clone());
                }
                fields.insert("error".to_string(), error.clone());
                fields.insert("retry_count".to_string(), retry_count.to_string());
            }
            Self::CannotFix {
                alertname,
                lambda_function,
                reason,
                ..
            } => {
                fields.insert("alertname".to_string(), alertname.clone());
                fields.insert("lambda_function".to_string(), lambda_function.clone());
                fields.insert("reason".to_string(), reason.clone());
            }
            Self::ApprovalPending {
                alertname,
                lambda_function,
                request_id,
                ..
            } => {
                fields.insert("alertname".to_string(), alertname.clone());
                fields.insert("lambda_function".to_string(), lambda_function.clone());
                fields.insert("request_id".to_string(), request_id.clone());
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_titles_and_severity() {
        let event = NotifyEvent::CannotFix {
            alertname: "FluxReconciliationFailure".to_string(),
            lambda_function: "flux-reconcile-kustomization".to_string(),
            correlation_id: "corr-1".to_string(),
            reason: "connection refused".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.title(), "Cannot Fix: FluxReconciliationFailure");
        assert_eq!(event.severity(), Severity::Critical);
        assert_eq!(event.correlation_id(), "corr-1");
    }

    #[test]
    fn test_fields_include_correlation_id() {
        let event = NotifyEvent::RemediationFailed {
            alertname: "PodCrashLooping".to_string(),
            lambda_function: Some("pod-restart".to_string()),
            correlation_id: "corr-2".to_string(),
            error: "HTTP 503".to_string(),
            retry_count: 3,
            timestamp: Utc::now(),
        };
        let fields = event.fields();
        assert_eq!(fields["correlation_id"], "corr-2");
        assert_eq!(fields["retry_count"], "3");
    }
}
