//! Recursive-reasoning model client.
//!
//! The reasoner iteratively refines a structured answer but has no tool
//! calling, so its output is free text carrying a JSON object. This client
//! extracts and validates that object, falling back to a keyword rule
//! table when the model is unavailable or unparseable.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::alert::Alert;
use crate::error::AgentError;
use crate::observability;
use crate::selection::schema::{LambdaFunction, SelectionMethod};

const REASONER_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ITERATIONS: u32 = 10;

/// A draft selection produced by the reasoner or its rule fallback.
#[derive(Debug, Clone)]
pub struct ReasonerSelection {
    pub lambda_function: LambdaFunction,
    pub parameters: HashMap<String, Value>,
    pub reasoning: String,
    pub confidence: f64,
    pub method: SelectionMethod,
}

#[derive(Debug, Deserialize)]
struct ReasonerResponse {
    #[serde(default)]
    result: String,
}

#[derive(Debug, Deserialize)]
struct StructuredOutput {
    lambda_function: String,
    #[serde(default)]
    parameters: HashMap<String, Value>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Client for the recursive-reasoning inference service.
pub struct RecursiveReasoner {
    api_url: String,
    model_path: Option<PathBuf>,
    client: reqwest::Client,
}

impl RecursiveReasoner {
    #[must_use]
    pub fn new(api_url: &str, model_path: Option<PathBuf>) -> Self {
        Self {
            api_url: api_url.to_string(),
            model_path,
            client: reqwest::Client::new(),
        }
    }

    /// The reasoning phase runs only when a model checkpoint is present.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.model_path.as_ref().is_some_and(|path| path.exists())
    }

    /// Ask the reasoner for a selection. Parse failures and transport
    /// errors degrade to the rule-based fallback; `None` means not even
    /// the fallback matched.
    pub async fn select(&self, alert: &Alert) -> Option<ReasonerSelection> {
        match self.reason(alert).await {
            Ok(Some(selection)) => {
                observability::record_selector_inference("trm_recursive_reasoning", "success");
                info!(
                    alertname = alert.name(),
                    lambda_function = %selection.lambda_function,
                    confidence = selection.confidence,
                    "reasoner selection"
                );
                Some(selection)
            }
            Ok(None) => {
                observability::record_selector_inference("trm_recursive_reasoning", "no_output");
                observability::record_selector_fallback("reasoner_no_output");
                rule_based_selection(alert)
            }
            Err(error) => {
                observability::record_selector_inference("trm_recursive_reasoning", "error");
                observability::record_selector_fallback("reasoner_error");
                warn!(alertname = alert.name(), %error, "reasoner failed, using rule-based fallback");
                rule_based_selection(alert)
            }
        }
    }

    async fn reason(&self, alert: &Alert) -> Result<Option<ReasonerSelection>, AgentError> {
        let response = self
            .client
            .post(format!("{}/reason", self.api_url))
            .timeout(REASONER_TIMEOUT)
            .json(&serde_json::json!({
                "problem": problem_prompt(alert),
                "max_iterations": MAX_ITERATIONS,
            }))
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let body: ReasonerResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        Ok(parse_structured_output(&body.result))
    }
}

/// Build the problem statement handed to the reasoner.
fn problem_prompt(alert: &Alert) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Analyze this Prometheus alert and select the appropriate remediation Lambda function.\n\n",
    );
    prompt.push_str(&format!("Alert Name: {}\n", alert.name()));
    prompt.push_str(&format!(
        "Labels: {}\n",
        serde_json::to_string(&alert.labels).unwrap_or_default()
    ));
    prompt.push_str(&format!(
        "Annotations: {}\n\n",
        serde_json::to_string(&alert.merged_annotations()).unwrap_or_default()
    ));

    prompt.push_str("Available Lambda Functions:\n");
    for function in LambdaFunction::ALL {
        prompt.push_str(&format!("- {}: {}\n", function, function.description()));
    }

    prompt.push_str(
        "\nOutput JSON: {\"lambda_function\": \"...\", \"parameters\": {...}, \"reasoning\": \"...\"}\n",
    );
    prompt
}

/// Extract the JSON object carrying `lambda_function` from free text.
fn parse_structured_output(output: &str) -> Option<ReasonerSelection> {
    let key_index = output.find("\"lambda_function\"")?;
    let start = output[..key_index].rfind('{')?;

    // Walk forward to the balanced closing brace.
    let mut depth = 0usize;
    let mut end = None;
    for (offset, ch) in output[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let candidate = &output[start..end?];

    let parsed: StructuredOutput = serde_json::from_str(candidate).ok()?;
    let lambda_function = LambdaFunction::parse(&parsed.lambda_function)?;

    Some(ReasonerSelection {
        lambda_function,
        parameters: parsed.parameters,
        reasoning: if parsed.reasoning.is_empty() {
            "Recursive reasoning".to_string()
        } else {
            parsed.reasoning
        },
        confidence: parsed.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
        method: SelectionMethod::TrmRecursiveReasoning,
    })
}

/// Keyword rule table used when model phases cannot produce output.
#[must_use]
pub fn rule_based_selection(alert: &Alert) -> Option<ReasonerSelection> {
    let alertname = alert.name();

    if alertname.contains("FluxReconciliationFailure") {
        let mut parameters = HashMap::new();
        if let Some(name) = alert.resource_name() {
            parameters.insert("name".to_string(), Value::String(name.to_string()));
        }
        parameters.insert(
            "namespace".to_string(),
            Value::String(alert.resource_namespace().to_string()),
        );
        return Some(ReasonerSelection {
            lambda_function: LambdaFunction::FluxReconcileKustomization,
            parameters,
            reasoning: "Rule-based: Flux Kustomization failure".to_string(),
            confidence: 0.6,
            method: SelectionMethod::RuleBased,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(alertname: &str, labels: &[(&str, &str)]) -> Alert {
        Alert {
            alertname: Some(alertname.to_string()),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Alert::default()
        }
    }

    #[test]
    fn test_parse_structured_output_embedded_in_text() {
        let output = r#"After iterating, my conclusion:
        {"lambda_function": "pod-restart", "parameters": {"name": "api", "namespace": "prod"}, "reasoning": "crash loop", "confidence": 0.82}
        Done."#;
        let selection = parse_structured_output(output).unwrap();
        assert_eq!(selection.lambda_function, LambdaFunction::PodRestart);
        assert!((selection.confidence - 0.82).abs() < 1e-9);
        assert_eq!(selection.parameters["name"], "api");
    }

    #[test]
    fn test_parse_handles_nested_braces() {
        let output = r#"{"lambda_function": "scale-deployment", "parameters": {"name": "api", "extra": {"replicas": 3}}, "reasoning": "scale"}"#;
        let selection = parse_structured_output(output).unwrap();
        assert_eq!(selection.lambda_function, LambdaFunction::ScaleDeployment);
    }

    #[test]
    fn test_parse_rejects_unknown_function() {
        let output = r#"{"lambda_function": "rm-rf-cluster", "parameters": {}}"#;
        assert!(parse_structured_output(output).is_none());
    }

    #[test]
    fn test_parse_rejects_text_without_json() {
        assert!(parse_structured_output("no structured output here").is_none());
    }

    #[test]
    fn test_rule_based_flux_failure() {
        let alert = alert(
            "FluxReconciliationFailure",
            &[("name", "homepage"), ("namespace", "flux-system")],
        );
        let selection = rule_based_selection(&alert).unwrap();
        assert_eq!(
            selection.lambda_function,
            LambdaFunction::FluxReconcileKustomization
        );
        assert_eq!(selection.method, SelectionMethod::RuleBased);
        assert!((selection.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_rule_based_no_match() {
        let alert = alert("SomethingElse", &[]);
        assert!(rule_based_selection(&alert).is_none());
    }

    #[test]
    fn test_disabled_without_model_path() {
        let reasoner = RecursiveReasoner::new("http://reasoner", None);
        assert!(!reasoner.enabled());

        let missing = RecursiveReasoner::new(
            "http://reasoner",
            Some(PathBuf::from("/nonexistent/model/path")),
        );
        assert!(!missing.enabled());
    }

    #[tokio::test]
    async fn test_select_falls_back_to_rules_on_transport_error() {
        // Port 1 refuses connections.
        let reasoner = RecursiveReasoner::new("http://127.0.0.1:1", None);
        let alert = alert("FluxReconciliationFailure", &[("name", "homepage")]);
        let selection = reasoner.select(&alert).await.unwrap();
        assert_eq!(selection.method, SelectionMethod::RuleBased);
    }

    #[test]
    fn test_problem_prompt_lists_all_functions() {
        let prompt = problem_prompt(&alert("PodCrashLooping", &[("pod", "api")]));
        for function in LambdaFunction::ALL {
            assert!(prompt.contains(function.as_str()));
        }
    }
}
