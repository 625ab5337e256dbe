//! Example database: stored remediation outcomes used for few-shot prompts.
//!
//! Examples persist in a single JSON file. Writes are serialized by the
//! database's mutex and land atomically via a temp-file rename. Retention
//! is LRU bounded at 1000 entries, oldest by timestamp evicted first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::alert::canonical_labels;

const MAX_EXAMPLES: usize = 1000;

/// A past (alert → action → outcome) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationExample {
    pub alertname: String,
    pub labels: HashMap<String, String>,
    pub lambda_function: String,
    pub parameters: HashMap<String, Value>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl RemediationExample {
    /// Content-derived identity: SHA-256 over the alert name and
    /// canonicalized labels.
    #[must_use]
    pub fn identity(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.alertname.as_bytes());
        hasher.update(b"|");
        hasher.update(canonical_labels(&self.labels).as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }

    /// Label-overlap similarity: matching keys over the distinct key
    /// union, with a 0.5 partial credit on the important keys.
    #[must_use]
    pub fn label_similarity(&self, other: &HashMap<String, String>) -> f64 {
        let mut score = 0.0;
        let mut total = 0usize;

        let mut keys: Vec<&String> = self.labels.keys().chain(other.keys()).collect();
        keys.sort();
        keys.dedup();

        for key in keys {
            total += 1;
            match (self.labels.get(key), other.get(key)) {
                (Some(a), Some(b)) if a == b => score += 1.0,
                (Some(_), Some(_))
                    if matches!(key.as_str(), "alertname" | "namespace" | "kind") =>
                {
                    score += 0.5;
                }
                _ => {}
            }
        }

        if total == 0 {
            0.0
        } else {
            score / total as f64
        }
    }
}

/// On-disk layout of the example file.
#[derive(Debug, Serialize, Deserialize)]
struct ExampleFile {
    examples: Vec<RemediationExample>,
    updated_at: DateTime<Utc>,
}

/// JSON-file-backed example store.
pub struct ExampleDatabase {
    path: Option<PathBuf>,
    examples: Mutex<Vec<RemediationExample>>,
}

impl ExampleDatabase {
    /// In-memory database, for tests and development.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            examples: Mutex::new(Vec::new()),
        }
    }

    /// Load the database from a file, starting empty when the file is
    /// missing or unreadable.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let examples = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<ExampleFile>(&bytes) {
                Ok(file) => {
                    info!(count = file.examples.len(), path = %path.display(), "examples loaded");
                    file.examples
                }
                Err(error) => {
                    warn!(%error, path = %path.display(), "failed to parse example file");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path: Some(path.to_path_buf()),
            examples: Mutex::new(examples),
        }
    }

    /// Add an example, evict beyond the retention bound, and persist.
    pub async fn add_example(
        &self,
        alertname: &str,
        labels: HashMap<String, String>,
        lambda_function: &str,
        parameters: HashMap<String, Value>,
        success: bool,
        reasoning: Option<&str>,
    ) {
        let example = RemediationExample {
            alertname: alertname.to_string(),
            labels,
            lambda_function: lambda_function.to_string(),
            parameters,
            success,
            timestamp: Utc::now(),
            reasoning: reasoning.map(ToString::to_string),
        };

        let snapshot = {
            let mut examples = self.examples.lock().await;
            examples.push(example);
            if examples.len() > MAX_EXAMPLES {
                examples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                examples.truncate(MAX_EXAMPLES);
            }
            examples.clone()
        };

        self.persist(&snapshot).await;

        info!(alertname, lambda_function, success, "example added");
    }

    async fn persist(&self, examples: &[RemediationExample]) {
        let Some(path) = &self.path else {
            return;
        };

        let file = ExampleFile {
            examples: examples.to_vec(),
            updated_at: Utc::now(),
        };
        let payload = match serde_json::to_vec_pretty(&file) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed to serialize examples");
                return;
            }
        };

        if let Some(parent) = path.parent() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                warn!(%error, "failed to create example directory");
                return;
            }
        }

        let tmp = path.with_extension("json.tmp");
        if let Err(error) = tokio::fs::write(&tmp, payload).await {
            warn!(%error, path = %tmp.display(), "failed to write examples");
            return;
        }
        if let Err(error) = tokio::fs::rename(&tmp, path).await {
            warn!(%error, path = %path.display(), "failed to replace example file");
            return;
        }

        debug!(count = examples.len(), path = %path.display(), "examples saved");
    }

    /// Find similar examples: 0.6 weight on an exact alertname match plus
    /// 0.4 weight on label overlap.
    pub async fn find_similar_examples(
        &self,
        alertname: &str,
        labels: &HashMap<String, String>,
        top_k: usize,
        min_similarity: f64,
        only_successful: bool,
    ) -> Vec<RemediationExample> {
        let examples = self.examples.lock().await;

        let mut candidates: Vec<(f64, &RemediationExample)> = examples
            .iter()
            .filter(|example| !only_successful || example.success)
            .filter_map(|example| {
                let alertname_match = if example.alertname == alertname { 1.0 } else { 0.0 };
                let similarity =
                    alertname_match * 0.6 + example.label_similarity(labels) * 0.4;
                (similarity >= min_similarity).then_some((similarity, example))
            })
            .collect();

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates
            .into_iter()
            .take(top_k)
            .map(|(_, example)| example.clone())
            .collect()
    }

    /// Number of stored examples.
    pub async fn len(&self) -> usize {
        self.examples.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.examples.lock().await.is_empty()
    }
}

/// Format retrieved examples into the few-shot prompt section.
#[must_use]
pub fn few_shot_prompt(
    alertname: &str,
    labels: &HashMap<String, String>,
    examples: &[RemediationExample],
) -> String {
    let mut prompt = String::from("Here are examples of successful remediation selections:\n\n");

    for (index, example) in examples.iter().take(5).enumerate() {
        prompt.push_str(&format!("Example {}:\n", index + 1));
        prompt.push_str(&format!("Alert: {}\n", example.alertname));
        prompt.push_str(&format!(
            "Labels: {}\n",
            serde_json::to_string(&example.labels).unwrap_or_default()
        ));
        prompt.push_str(&format!("Selected: {}\n", example.lambda_function));
        prompt.push_str(&format!(
            "Parameters: {}\n",
            serde_json::to_string(&example.parameters).unwrap_or_default()
        ));
        if let Some(reasoning) = &example.reasoning {
            prompt.push_str(&format!("Reasoning: {reasoning}\n"));
        }
        prompt.push_str(&format!(
            "Result: {}\n\n",
            if example.success { "Success" } else { "Failed" }
        ));
    }

    prompt.push_str("\nCurrent Alert:\n");
    prompt.push_str(&format!("Alert: {alertname}\n"));
    prompt.push_str(&format!(
        "Labels: {}\n",
        serde_json::to_string(labels).unwrap_or_default()
    ));
    prompt.push_str(
        "Select the appropriate Lambda function and parameters based on the examples above.\n",
    );

    prompt
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

    async fn seed(db: &ExampleDatabase, alertname: &str, namespace: &str, success: bool) {
        db.add_example(
            alertname,
            labels(&[("alertname", alertname), ("namespace", namespace)]),
            "pod-restart",
            HashMap::from([("name".to_string(), json!("api"))]),
            success,
            None,
        )
        .await;
    }

    #[tokio::test]
    async fn test_similarity_prefers_same_alertname() {
        let db = ExampleDatabase::in_memory();
        seed(&db, "PodCrashLooping", "production", true).await;
        seed(&db, "HighMemory", "production", true).await;

        let found = db
            .find_similar_examples(
                "PodCrashLooping",
                &labels(&[("alertname", "PodCrashLooping"), ("namespace", "production")]),
                5,
                0.3,
                true,
            )
            .await;
        assert_eq!(found[0].alertname, "PodCrashLooping");
    }

    #[tokio::test]
    async fn test_only_successful_filter() {
        let db = ExampleDatabase::in_memory();
        seed(&db, "PodCrashLooping", "production", false).await;

        let found = db
            .find_similar_examples(
                "PodCrashLooping",
                &labels(&[("alertname", "PodCrashLooping")]),
                5,
                0.3,
                true,
            )
            .await;
        assert!(found.is_empty());

        let with_failures = db
            .find_similar_examples(
                "PodCrashLooping",
                &labels(&[("alertname", "PodCrashLooping")]),
                5,
                0.3,
                false,
            )
            .await;
        assert_eq!(with_failures.len(), 1);
    }

    #[tokio::test]
    async fn test_retention_keeps_most_recent_thousand() {
        let db = ExampleDatabase::in_memory();
        for i in 0..1005 {
            db.add_example(
                &format!("Alert{i}"),
                HashMap::new(),
                "pod-restart",
                HashMap::new(),
                true,
                None,
            )
            .await;
        }
        assert_eq!(db.len().await, 1000);

        // The oldest entries were evicted.
        let found = db
            .find_similar_examples("Alert0", &HashMap::new(), 5, 0.5, true)
            .await;
        assert!(found.is_empty());
        let recent = db
            .find_similar_examples("Alert1004", &HashMap::new(), 5, 0.5, true)
            .await;
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("examples.json");

        {
            let db = ExampleDatabase::load(&path);
            seed(&db, "PodCrashLooping", "production", true).await;
        }

        let reloaded = ExampleDatabase::load(&path);
        assert_eq!(reloaded.len().await, 1);
    }

    #[test]
    fn test_identity_stable_under_label_ordering() {
        let a = RemediationExample {
            alertname: "PodCrashLooping".to_string(),
            labels: labels(&[("a", "1"), ("b", "2")]),
            lambda_function: "pod-restart".to_string(),
            parameters: HashMap::new(),
            success: true,
            timestamp: Utc::now(),
            reasoning: None,
        };
        let b = RemediationExample {
            labels: labels(&[("b", "2"), ("a", "1")]),
            ..a.clone()
        };
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_few_shot_prompt_shape() {
        let example = RemediationExample {
            alertname: "PodCrashLooping".to_string(),
            labels: labels(&[("pod", "api-abc123")]),
            lambda_function: "pod-restart".to_string(),
            parameters: HashMap::from([("name".to_string(), json!("api-abc123"))]),
            success: true,
            timestamp: Utc::now(),
            reasoning: Some("crash loop".to_string()),
        };
        let prompt = few_shot_prompt("PodCrashLooping", &example.labels.clone(), &[example]);
        assert!(prompt.contains("Example 1:"));
        assert!(prompt.contains("Selected: pod-restart"));
        assert!(prompt.contains("Current Alert:"));
    }
}
