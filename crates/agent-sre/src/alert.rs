//! Prometheus alert payload carried in alert CloudEvents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Alert payload as delivered in `data` of an alert event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Alert {
    /// "firing" or "resolved"
    pub status: String,
    /// Alert labels
    pub labels: HashMap<String, String>,
    /// Alert annotations
    pub annotations: HashMap<String, String>,
    /// Annotations common to the alert group
    pub common_annotations: HashMap<String, String>,
    /// When the alert started firing
    pub starts_at: Option<DateTime<Utc>>,
    /// Unique fingerprint, stable across retransmissions
    pub fingerprint: Option<String>,
    /// Alert name when carried at the top level of the payload
    pub alertname: Option<String>,
    /// Subject, used by some producers instead of alertname
    pub subject: Option<String>,
}

impl Alert {
    /// Parse the alert out of event data. Unknown payload shapes produce
    /// an empty alert whose name resolves to "unknown".
    #[must_use]
    pub fn from_event_data(data: &serde_json::Value) -> Self {
        serde_json::from_value(data.clone()).unwrap_or_default()
    }

    /// Resolve the alert name: top-level `alertname`, then `subject`, then
    /// the `alertname` label, then "unknown".
    #[must_use]
    pub fn name(&self) -> &str {
        self.alertname
            .as_deref()
            .or(self.subject.as_deref())
            .or_else(|| self.labels.get("alertname").map(String::as_str))
            .unwrap_or("unknown")
    }

    /// Check if this is a firing alert. An absent status is treated as
    /// firing; resolved alerts always say so.
    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.status.is_empty() || self.status == "firing"
    }

    /// Merged annotations, alert-specific winning over common ones.
    #[must_use]
    pub fn merged_annotations(&self) -> HashMap<String, String> {
        let mut merged = self.common_annotations.clone();
        merged.extend(self.annotations.clone());
        merged
    }

    /// Stable fingerprint. Producers that do not send one get a content
    /// hash of the alert name and canonicalized labels, so retransmissions
    /// keep the same identity.
    #[must_use]
    pub fn stable_fingerprint(&self) -> String {
        if let Some(fingerprint) = &self.fingerprint {
            if !fingerprint.is_empty() {
                return fingerprint.clone();
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        hasher.update(b"|");
        hasher.update(canonical_labels(&self.labels).as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Resource name fallback chain from labels.
    #[must_use]
    pub fn resource_name(&self) -> Option<&str> {
        ["name", "resource_name", "pod", "deployment", "kustomization"]
            .iter()
            .find_map(|key| self.labels.get(*key).map(String::as_str))
    }

    /// Namespace fallback chain from labels, defaulting to `flux-system`.
    #[must_use]
    pub fn resource_namespace(&self) -> &str {
        ["namespace", "resource_namespace"]
            .iter()
            .find_map(|key| self.labels.get(*key).map(String::as_str))
            .unwrap_or("flux-system")
    }

    /// Severity label, defaulting to "unknown".
    #[must_use]
    pub fn severity(&self) -> &str {
        self.labels.get("severity").map_or("unknown", String::as_str)
    }
}

/// Deterministic key-sorted rendering of a label map.
#[must_use]
pub fn canonical_labels(labels: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = labels.iter().collect();
    pairs.sort_by_key(|(key, _)| key.as_str());
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_name_fallback_chain() {
        let mut alert = Alert::default();
        assert_eq!(alert.name(), "unknown");

        alert.labels = labels(&[("alertname", "FromLabel")]);
        assert_eq!(alert.name(), "FromLabel");

        alert.subject = Some("FromSubject".to_string());
        assert_eq!(alert.name(), "FromSubject");

        alert.alertname = Some("TopLevel".to_string());
        assert_eq!(alert.name(), "TopLevel");
    }

    #[test]
    fn test_annotation_merge_alert_specific_wins() {
        let alert = Alert {
            annotations: labels(&[("lambda_function", "pod-restart")]),
            common_annotations: labels(&[
                ("lambda_function", "scale-deployment"),
                ("runbook", "wiki/pods"),
            ]),
            ..Alert::default()
        };
        let merged = alert.merged_annotations();
        assert_eq!(merged["lambda_function"], "pod-restart");
        assert_eq!(merged["runbook"], "wiki/pods");
    }

    #[test]
    fn test_stable_fingerprint_is_deterministic() {
        let a = Alert {
            alertname: Some("PodCrashLooping".to_string()),
            labels: labels(&[("pod", "api-abc123"), ("namespace", "production")]),
            ..Alert::default()
        };
        let b = Alert {
            alertname: Some("PodCrashLooping".to_string()),
            labels: labels(&[("namespace", "production"), ("pod", "api-abc123")]),
            ..Alert::default()
        };
        assert_eq!(a.stable_fingerprint(), b.stable_fingerprint());

        let explicit = Alert {
            fingerprint: Some("fp-1".to_string()),
            ..a.clone()
        };
        assert_eq!(explicit.stable_fingerprint(), "fp-1");
    }

    #[test]
    fn test_resource_fallbacks() {
        let alert = Alert {
            labels: labels(&[("pod", "api-abc123")]),
            ..Alert::default()
        };
        assert_eq!(alert.resource_name(), Some("api-abc123"));
        assert_eq!(alert.resource_namespace(), "flux-system");
    }

    #[test]
    fn test_from_event_data() {
        let data = json!({
            "status": "firing",
            "labels": { "alertname": "FluxReconciliationFailure", "name": "homepage" },
            "annotations": { "lambda_function": "flux-reconcile-kustomization" },
            "commonAnnotations": { "team": "platform" }
        });
        let alert = Alert::from_event_data(&data);
        assert!(alert.is_firing());
        assert_eq!(alert.name(), "FluxReconciliationFailure");
        assert_eq!(alert.common_annotations["team"], "platform");
    }
}
