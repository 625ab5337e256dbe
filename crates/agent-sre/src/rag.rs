//! Vector store and retrieval of similar past incidents.
//!
//! Each indexed alert carries an embedding produced by a pluggable
//! [`Embedder`]. Without a semantic model, a deterministic hash-bit
//! embedding stands in; it is not semantic, but it keeps retrieval
//! behaviour stable and testable. Retention is a 5000-entry LRU.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::alert::{canonical_labels, Alert};

const MAX_EMBEDDINGS: usize = 5000;
const HASH_DIMENSIONS: usize = 128;

/// Embedding function used by the vector store.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic 128-dim hash-bit fallback embedding (non-semantic).
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..HASH_DIMENSIONS)
            .map(|i| {
                let byte = digest[(i / 8) % digest.len()];
                let bit = (byte >> (i % 8)) & 1;
                f32::from(bit)
            })
            .collect()
    }
}

/// An indexed alert with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEmbedding {
    pub id: String,
    pub alertname: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub lambda_function: Option<String>,
    pub parameters: Option<HashMap<String, Value>>,
    pub success: Option<bool>,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
}

impl AlertEmbedding {
    fn new(
        alertname: &str,
        labels: HashMap<String, String>,
        annotations: HashMap<String, String>,
        lambda_function: Option<String>,
        parameters: Option<HashMap<String, Value>>,
        success: Option<bool>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(alertname.as_bytes());
        hasher.update(b":");
        hasher.update(canonical_labels(&labels).as_bytes());
        let id = hex::encode(&hasher.finalize()[..8]);

        Self {
            id,
            alertname: alertname.to_string(),
            labels,
            annotations,
            lambda_function,
            parameters,
            success,
            embedding: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Text rendering fed to the embedder.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut parts = vec![
            format!("Alert: {}", self.alertname),
            format!(
                "Labels: {}",
                serde_json::to_string(&self.labels).unwrap_or_default()
            ),
        ];
        if let Some(lambda_function) = &self.lambda_function {
            parts.push(format!("Remediation: {lambda_function}"));
            parts.push(format!(
                "Parameters: {}",
                serde_json::to_string(&self.parameters).unwrap_or_default()
            ));
        }
        if let Some(success) = self.success {
            parts.push(format!("Success: {success}"));
        }
        parts.join(" | ")
    }
}

/// Bounded in-process vector store.
pub struct VectorStore {
    embeddings: RwLock<Vec<AlertEmbedding>>,
    embedder: Box<dyn Embedder>,
}

impl VectorStore {
    #[must_use]
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embeddings: RwLock::new(Vec::new()),
            embedder,
        }
    }

    #[must_use]
    pub fn with_hash_embedder() -> Self {
        Self::new(Box::new(HashEmbedder))
    }

    /// Index an alert; evicts the oldest entries beyond the bound.
    pub async fn add_alert(
        &self,
        alertname: &str,
        labels: HashMap<String, String>,
        annotations: HashMap<String, String>,
        lambda_function: Option<String>,
        parameters: Option<HashMap<String, Value>>,
        success: Option<bool>,
    ) -> String {
        let mut alert = AlertEmbedding::new(
            alertname,
            labels,
            annotations,
            lambda_function,
            parameters,
            success,
        );
        alert.embedding = self.embedder.embed(&alert.to_text());
        let id = alert.id.clone();

        let mut embeddings = self.embeddings.write().await;
        embeddings.push(alert);
        if embeddings.len() > MAX_EMBEDDINGS {
            embeddings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            embeddings.truncate(MAX_EMBEDDINGS);
        }

        debug!(alert_id = %id, alertname, "alert added to vector store");
        id
    }

    /// Cosine-similarity search over the stored embeddings, newest first
    /// on ties.
    pub async fn similarity_search(
        &self,
        alertname: &str,
        labels: &HashMap<String, String>,
        top_k: usize,
        min_similarity: f32,
        only_successful: bool,
    ) -> Vec<(f32, AlertEmbedding)> {
        let query = AlertEmbedding::new(
            alertname,
            labels.clone(),
            HashMap::new(),
            None,
            None,
            None,
        );
        let query_embedding = self.embedder.embed(&query.to_text());

        let embeddings = self.embeddings.read().await;
        let mut candidates: Vec<(f32, AlertEmbedding)> = embeddings
            .iter()
            .filter(|alert| !only_successful || alert.success != Some(false))
            .filter_map(|alert| {
                let similarity = cosine_similarity(&query_embedding, &alert.embedding);
                (similarity >= min_similarity).then(|| (similarity, alert.clone()))
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
        });
        candidates.truncate(top_k);
        candidates
    }

    pub async fn len(&self) -> usize {
        self.embeddings.read().await.len()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// A retrieved similar incident, ready for prompt injection.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarIncident {
    pub alertname: String,
    pub labels: HashMap<String, String>,
    pub lambda_function: Option<String>,
    pub parameters: Option<HashMap<String, Value>>,
    pub success: Option<bool>,
    pub similarity: f32,
}

/// Retrieval facade used by the selector.
pub struct RemediationRag {
    store: VectorStore,
}

impl RemediationRag {
    #[must_use]
    pub fn new(store: VectorStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn with_hash_embedder() -> Self {
        Self::new(VectorStore::with_hash_embedder())
    }

    /// Find similar past alerts and their remediations.
    pub async fn find_similar_alerts(&self, alert: &Alert, top_k: usize) -> Vec<SimilarIncident> {
        self.store
            .similarity_search(alert.name(), &alert.labels, top_k, 0.3, true)
            .await
            .into_iter()
            .map(|(similarity, stored)| SimilarIncident {
                alertname: stored.alertname,
                labels: stored.labels,
                lambda_function: stored.lambda_function,
                parameters: stored.parameters,
                success: stored.success,
                similarity,
            })
            .collect()
    }

    /// Index an alert and its (possibly not yet verified) remediation.
    pub async fn index_alert(
        &self,
        alert: &Alert,
        lambda_function: Option<&str>,
        parameters: Option<&HashMap<String, Value>>,
        success: Option<bool>,
    ) {
        self.store
            .add_alert(
                alert.name(),
                alert.labels.clone(),
                alert.merged_annotations(),
                lambda_function.map(ToString::to_string),
                parameters.cloned(),
                success,
            )
            .await;
    }

    #[must_use]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }
}

/// Format retrieved incidents into the "Similar Past Incidents" prompt
/// section.
#[must_use]
pub fn rag_prompt_section(similar: &[SimilarIncident]) -> String {
    if similar.is_empty() {
        return String::new();
    }

    let mut prompt = String::from("\n\nSimilar Past Incidents:\n");
    for (index, incident) in similar.iter().enumerate() {
        prompt.push_str(&format!("{}. {}: ", index + 1, incident.alertname));
        if let Some(lambda_function) = &incident.lambda_function {
            prompt.push_str(&format!("{lambda_function} "));
            prompt.push_str(&format!(
                "({}) ",
                serde_json::to_string(&incident.parameters).unwrap_or_default()
            ));
        }
        let success = incident
            .success
            .map_or_else(|| "Unknown".to_string(), |s| s.to_string());
        prompt.push_str(&format!("[Success: {success}]\n"));
    }
    prompt
}
