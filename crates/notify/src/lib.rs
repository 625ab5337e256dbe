//! Notification system for remediation lifecycle events.
//!
//! This crate provides a fire-and-forget notification system for raising
//! tickets and alerts when remediations complete, fail, or stall waiting
//! for approval.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! // Create notifier from environment variables
//! let notifier = Notifier::from_env();
//!
//! // Send a notification (fire-and-forget)
//! notifier.notify(NotifyEvent::RemediationCompleted {
//!     alertname: "FluxReconciliationFailure".to_string(),
//!     lambda_function: "flux-reconcile-kustomization".to_string(),
//!     correlation_id: "corr-1".to_string(),
//!     timestamp: chrono::Utc::now(),
//! });
//! ```
//!
//! # Configuration
//!
//! - `TICKET_WEBHOOK_URL`: ticket webhook URL (enables the ticket channel)
//! - `NOTIFY_DISABLED`: set to "true" to disable all notifications
//!
//! # Architecture
//!
//! The notification system uses a trait-based channel design:
//!
//! - [`NotifyChannel`] defines the interface for notification channels
//! - [`TicketChannel`] posts tickets to an issue-tracker webhook
//! - [`Notifier`] dispatches events to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::ticket::TicketChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Central notification dispatcher.
///
/// Manages notification channels and dispatches events to all enabled
/// channels in a fire-and-forget manner.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a new notifier from environment variables, auto-detecting
    /// which channels are configured.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("notifications disabled via NOTIFY_DISABLED");
            return Self {
                channels: vec![],
                disabled: true,
            };
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let ticket = TicketChannel::from_env();
        if ticket.enabled() {
            info!("ticket notifications enabled");
            channels.push(Arc::new(ticket));
        }

        if channels.is_empty() {
            warn!("no notification channels configured");
        } else {
            info!(channel_count = channels.len(), "notification system initialized");
        }

        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Send a notification to all enabled channels (fire-and-forget).
    ///
    /// Spawns a task per channel and returns immediately. Errors are logged
    /// but never propagated to the caller.
    pub fn notify(&self, event: NotifyEvent) {
        if self.disabled || self.channels.is_empty() {
            debug!("notifications disabled or unconfigured, skipping event");
            return;
        }

        let event = Arc::new(event);

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                let channel_name = channel.name();

                if !channel.enabled() {
                    debug!(channel = channel_name, "channel disabled, skipping");
                    return;
                }

                match channel.send(&event).await {
                    Ok(()) => {
                        debug!(channel = channel_name, "notification sent");
                    }
                    Err(e) => {
                        error!(
                            channel = channel_name,
                            error = %e,
                            correlation_id = event.correlation_id(),
                            "failed to send notification"
                        );
                    }
                }
            });
        }
    }

    /// Send a notification and wait for all channels to complete. Useful
    /// for testing or when delivery confirmation is needed.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            return vec![];
        }

        let mut results = vec![];
        for channel in &self.channels {
            let channel_name = channel.name().to_string();
            let result = channel.send(&event).await;
            results.push((channel_name, result));
        }
        results
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_disabled_notifier() {
        let notifier = Notifier::disabled();
        assert!(!notifier.has_channels());
    }

    #[tokio::test]
    async fn test_notify_and_wait_reaches_channels() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            Notifier::with_channels(vec![Arc::new(TicketChannel::new(server.uri()))]);
        let results = notifier
            .notify_and_wait(NotifyEvent::RemediationCompleted {
                alertname: "PodCrashLooping".to_string(),
                lambda_function: "pod-restart".to_string(),
                correlation_id: "corr-1".to_string(),
                timestamp: Utc::now(),
            })
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
    }
}
