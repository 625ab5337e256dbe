//! The remediation selector: a cascading pipeline with calibrated
//! confidence.
//!
//! Layers, cheapest first: static annotations, the recursive-reasoning
//! model (with its own keyword-rule fallback when the model's output
//! cannot be parsed), and retrieval of similar past incidents plus
//! few-shot exemplars feeding an LLM function call. Every emitted
//! selection carries the method that produced it and a confidence in
//! [0, 1]; confidence 1.0 is reserved for static annotations.

pub mod llm;
pub mod reasoner;
pub mod schema;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alert::Alert;
use crate::few_shot::{few_shot_prompt, ExampleDatabase};
use crate::observability;
use crate::rag::{rag_prompt_section, RemediationRag};

pub use llm::LlmClient;
pub use reasoner::RecursiveReasoner;
pub use schema::{LambdaFunction, LambdaSelection, SelectionMethod};

const RAG_TOP_K: usize = 3;
const FEW_SHOT_TOP_K: usize = 5;

/// Layered selection pipeline.
pub struct RemediationSelector {
    reasoner: RecursiveReasoner,
    llm: LlmClient,
    rag: Arc<RemediationRag>,
    examples: Arc<ExampleDatabase>,
}

impl RemediationSelector {
    #[must_use]
    pub fn new(
        reasoner: RecursiveReasoner,
        llm: LlmClient,
        rag: Arc<RemediationRag>,
        examples: Arc<ExampleDatabase>,
    ) -> Self {
        Self {
            reasoner,
            llm,
            rag,
            examples,
        }
    }

    /// Run the pipeline. `None` means every layer failed and the workflow
    /// should end the task with a selection failure.
    pub async fn select(&self, alert: &Alert) -> Option<LambdaSelection> {
        // Phase 0: static annotation fast path.
        if let Some(selection) = self.static_annotation(alert) {
            self.index_selection(alert, &selection).await;
            return Some(selection);
        }

        // Phase 1: recursive reasoning, when the model is present.
        if self.reasoner.enabled() {
            if let Some(draft) = self.reasoner.select(alert).await {
                let mut selection = LambdaSelection {
                    lambda_function: draft.lambda_function,
                    parameters: draft.parameters,
                    method: draft.method,
                    confidence: draft.confidence,
                    reasoning: draft.reasoning,
                    similar_incidents: 0,
                    few_shot_examples: 0,
                };
                validate_and_enrich(&mut selection, alert);
                observability::record_selector_confidence(selection.confidence);
                self.index_selection(alert, &selection).await;
                return Some(selection);
            }
        }

        // Phase 2: gather retrieval context.
        let similar = self.rag.find_similar_alerts(alert, RAG_TOP_K).await;
        let examples = self
            .examples
            .find_similar_examples(alert.name(), &alert.labels, FEW_SHOT_TOP_K, 0.3, true)
            .await;
        debug!(
            similar_incidents = similar.len(),
            few_shot_examples = examples.len(),
            "selection context gathered"
        );

        // Phase 3: LLM function call over the enriched prompt.
        if self.llm.enabled() {
            let rag_section = rag_prompt_section(&similar);
            let few_shot_section = if examples.is_empty() {
                String::new()
            } else {
                few_shot_prompt(alert.name(), &alert.labels, &examples)
            };
            let prompt = llm::selection_prompt(alert, &rag_section, &few_shot_section);

            match self.llm.select(&prompt).await {
                Ok(draft) => {
                    observability::record_selector_inference("ai_function_calling", "success");
                    let mut selection = LambdaSelection {
                        lambda_function: draft.lambda_function,
                        parameters: value_to_map(draft.parameters),
                        method: SelectionMethod::AiFunctionCalling,
                        confidence: 0.0,
                        reasoning: draft.reasoning,
                        similar_incidents: similar.len(),
                        few_shot_examples: examples.len(),
                    };
                    // Phases 4 and 5: validate, enrich, calibrate.
                    validate_and_enrich(&mut selection, alert);
                    selection.confidence = calculate_confidence(&selection);
                    observability::record_selector_confidence(selection.confidence);

                    info!(
                        alertname = alert.name(),
                        lambda_function = %selection.lambda_function,
                        method = selection.method.as_str(),
                        confidence = selection.confidence,
                        similar_incidents = selection.similar_incidents,
                        "selection emitted"
                    );

                    // Phase 6: index with unknown outcome; verification
                    // patches it later.
                    self.index_selection(alert, &selection).await;
                    return Some(selection);
                }
                Err(error) => {
                    observability::record_selector_inference("ai_function_calling", "error");
                    observability::record_selector_fallback("llm_error");
                    warn!(alertname = alert.name(), %error, "LLM selection failed");
                }
            }
        }

        warn!(alertname = alert.name(), "all selection layers failed");
        None
    }

    /// Phase 0: a `lambda_function` annotation maps the alert 1:1 to its
    /// remediation. Static annotations are authoritative: confidence 1.0.
    fn static_annotation(&self, alert: &Alert) -> Option<LambdaSelection> {
        let annotations = alert.merged_annotations();
        let name = annotations.get("lambda_function")?;

        let Some(lambda_function) = LambdaFunction::parse(name) else {
            warn!(
                alertname = alert.name(),
                lambda_function = %name,
                "annotation names a function outside the allowed set"
            );
            return None;
        };

        let parameters = annotations
            .get("lambda_parameters")
            .and_then(|raw| serde_json::from_str::<HashMap<String, Value>>(raw).ok())
            .unwrap_or_default();

        let mut selection = LambdaSelection {
            lambda_function,
            parameters,
            method: SelectionMethod::StaticAnnotation,
            confidence: 1.0,
            reasoning: "Using static annotation from PrometheusRule".to_string(),
            similar_incidents: 0,
            few_shot_examples: 0,
        };
        validate_and_enrich(&mut selection, alert);

        info!(
            alertname = alert.name(),
            lambda_function = %selection.lambda_function,
            "using static annotation"
        );
        Some(selection)
    }

    async fn index_selection(&self, alert: &Alert, selection: &LambdaSelection) {
        self.rag
            .index_alert(
                alert,
                Some(selection.lambda_function.as_str()),
                Some(&selection.parameters),
                None,
            )
            .await;
    }
}

/// Phase 4: make sure `name` and `namespace` are present, defaulting from
/// labels, and fill function-specific parameters.
pub fn validate_and_enrich(selection: &mut LambdaSelection, alert: &Alert) {
    let parameters = &mut selection.parameters;

    let name_missing = parameters
        .get("name")
        .and_then(Value::as_str)
        .is_none_or(str::is_empty);
    if name_missing {
        let name = alert.resource_name().unwrap_or("unknown");
        parameters.insert("name".to_string(), Value::String(name.to_string()));
    }

    let namespace_missing = parameters
        .get("namespace")
        .and_then(Value::as_str)
        .is_none_or(str::is_empty);
    if namespace_missing {
        parameters.insert(
            "namespace".to_string(),
            Value::String(alert.resource_namespace().to_string()),
        );
    }

    match selection.lambda_function {
        LambdaFunction::ScaleDeployment => {
            if !parameters.contains_key("replicas") {
                let replicas = alert
                    .labels
                    .get("expected")
                    .or_else(|| alert.labels.get("replicas"))
                    .and_then(|raw| raw.parse::<i64>().ok());
                match replicas {
                    Some(replicas) => {
                        parameters.insert("replicas".to_string(), Value::from(replicas));
                    }
                    None => warn!(
                        alertname = alert.name(),
                        "scale-deployment selected without a usable replica count"
                    ),
                }
            }
        }
        LambdaFunction::PodRestart => {
            parameters
                .entry("type".to_string())
                .or_insert_with(|| Value::String("pod".to_string()));
        }
        _ => {}
    }
}

/// Phase 5: calibrated confidence for LLM selections.
///
/// Base 0.5, +0.2 with similar incidents, +0.1 for reasoning longer than
/// 50 chars and +0.1 more past 100, +0.1 when name and namespace are both
/// present, capped at 1.0.
#[must_use]
pub fn calculate_confidence(selection: &LambdaSelection) -> f64 {
    let mut confidence: f64 = 0.5;

    if selection.similar_incidents > 0 {
        confidence += 0.2;
    }

    let reasoning_len = selection.reasoning.len();
    if reasoning_len > 50 {
        confidence += 0.1;
    }
    if reasoning_len > 100 {
        confidence += 0.1;
    }

    let has = |key: &str| {
        selection
            .parameters
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty() && v != "unknown")
    };
    if has("name") && has("namespace") {
        confidence += 0.1;
    }

    confidence.min(1.0)
}

fn value_to_map(value: Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert_with(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> Alert {
        Alert {
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            annotations: annotations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Alert::default()
        }
    }

    fn selector() -> RemediationSelector {
        RemediationSelector::new(
            RecursiveReasoner::new("http://127.0.0.1:1", None),
            LlmClient::new(None),
            Arc::new(RemediationRag::with_hash_embedder()),
            Arc::new(ExampleDatabase::in_memory()),
        )
    }

    #[tokio::test]
    async fn test_static_annotation_fast_path() {
        let selector = selector();
        let alert = alert_with(
            &[
                ("alertname", "FluxReconciliationFailure"),
                ("name", "homepage"),
                ("namespace", "flux-system"),
            ],
            &[
                ("lambda_function", "flux-reconcile-kustomization"),
                ("lambda_parameters", "{}"),
            ],
        );

        let selection = selector.select(&alert).await.unwrap();
        assert_eq!(selection.method, SelectionMethod::StaticAnnotation);
        assert!((selection.confidence - 1.0).abs() < 1e-9);
        assert_eq!(selection.parameters["name"], "homepage");
        assert_eq!(selection.parameters["namespace"], "flux-system");
    }

    #[tokio::test]
    async fn test_unknown_annotation_function_is_rejected() {
        let selector = selector();
        let alert = alert_with(
            &[("alertname", "Whatever")],
            &[("lambda_function", "delete-everything")],
        );
        // The annotation is outside the allowed set, and no other layer can
        // produce output, so selection fails.
        let result = selector.select(&alert).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_no_rule_fallback_outside_reasoner_phase() {
        // The keyword rule table only backs up the reasoner phase. With
        // the reasoner disabled and no LLM configured, selection fails
        // even for alerts the rule table knows about.
        let selector = selector();
        let alert = alert_with(
            &[
                ("alertname", "FluxReconciliationFailure"),
                ("name", "homepage"),
            ],
            &[],
        );
        assert!(selector.select(&alert).await.is_none());
    }

    #[tokio::test]
    async fn test_all_layers_fail_returns_none() {
        let selector = selector();
        let alert = alert_with(&[("alertname", "CompletelyUnknownAlert")], &[]);
        assert!(selector.select(&alert).await.is_none());
    }

    #[test]
    fn test_validate_enriches_pod_restart_type() {
        let alert = alert_with(&[("pod", "api-abc123"), ("namespace", "production")], &[]);
        let mut selection = LambdaSelection {
            lambda_function: LambdaFunction::PodRestart,
            parameters: HashMap::new(),
            method: SelectionMethod::AiFunctionCalling,
            confidence: 0.0,
            reasoning: String::new(),
            similar_incidents: 0,
            few_shot_examples: 0,
        };
        validate_and_enrich(&mut selection, &alert);
        assert_eq!(selection.parameters["name"], "api-abc123");
        assert_eq!(selection.parameters["namespace"], "production");
        assert_eq!(selection.parameters["type"], "pod");
    }

    #[test]
    fn test_validate_enriches_scale_deployment_replicas() {
        let alert = alert_with(
            &[("deployment", "api-server"), ("expected", "3")],
            &[],
        );
        let mut selection = LambdaSelection {
            lambda_function: LambdaFunction::ScaleDeployment,
            parameters: HashMap::new(),
            method: SelectionMethod::AiFunctionCalling,
            confidence: 0.0,
            reasoning: String::new(),
            similar_incidents: 0,
            few_shot_examples: 0,
        };
        validate_and_enrich(&mut selection, &alert);
        assert_eq!(selection.parameters["replicas"], json!(3));
    }

    #[test]
    fn test_confidence_calibration() {
        let base = LambdaSelection {
            lambda_function: LambdaFunction::PodRestart,
            parameters: HashMap::new(),
            method: SelectionMethod::AiFunctionCalling,
            confidence: 0.0,
            reasoning: String::new(),
            similar_incidents: 0,
            few_shot_examples: 0,
        };
        assert!((calculate_confidence(&base) - 0.5).abs() < 1e-9);

        let mut rich = base.clone();
        rich.similar_incidents = 2;
        rich.reasoning = "r".repeat(120);
        rich.parameters
            .insert("name".to_string(), json!("api-abc123"));
        rich.parameters
            .insert("namespace".to_string(), json!("production"));
        assert!((calculate_confidence(&rich) - 1.0).abs() < 1e-9);

        let mut unknown_name = base;
        unknown_name
            .parameters
            .insert("name".to_string(), json!("unknown"));
        unknown_name
            .parameters
            .insert("namespace".to_string(), json!("production"));
        assert!((calculate_confidence(&unknown_name) - 0.5).abs() < 1e-9);
    }
}
