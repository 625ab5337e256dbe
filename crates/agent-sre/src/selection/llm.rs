//! Function-calling LLM client for remediation selection.
//!
//! Sends a structured-output prompt to a generation endpoint and parses
//! the returned JSON. When the response is not clean JSON, a substring
//! scan over the allowed function names recovers the selection.

use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::alert::Alert;
use crate::error::AgentError;
use crate::selection::schema::LambdaFunction;

const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Raw LLM selection before validation and enrichment.
#[derive(Debug, Clone)]
pub struct LlmSelection {
    pub lambda_function: LambdaFunction,
    pub parameters: Value,
    pub reasoning: String,
}

/// Client for the function-calling LLM endpoint.
pub struct LlmClient {
    url: Option<String>,
    client: reqwest::Client,
}

impl LlmClient {
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Run the prompt and parse a selection out of the response.
    pub async fn select(&self, prompt: &str) -> Result<LlmSelection, AgentError> {
        let url = self
            .url
            .as_ref()
            .ok_or_else(|| AgentError::Workflow("LLM endpoint not configured".to_string()))?;

        let response = self
            .client
            .post(url)
            .timeout(LLM_TIMEOUT)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        parse_llm_response(&body)
    }
}

/// Parse a selection from an LLM response body. Accepts a direct JSON
/// object, a `{"response": "<text>"}` wrapper, or free text containing a
/// known function name.
pub fn parse_llm_response(body: &Value) -> Result<LlmSelection, AgentError> {
    // Direct structured output.
    if let Some(selection) = selection_from_object(body) {
        return Ok(selection);
    }

    // Text wrapped in a generation envelope.
    let text = body
        .get("response")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_else(|| body.to_string());

    // JSON embedded in the text.
    if let Ok(parsed) = serde_json::from_str::<Value>(&text) {
        if let Some(selection) = selection_from_object(&parsed) {
            return Ok(selection);
        }
    }

    // Last resort: scan for an allowed function name in the raw text.
    let lowered = text.to_lowercase();
    for function in LambdaFunction::ALL {
        if lowered.contains(function.as_str()) {
            warn!(
                lambda_function = %function,
                "LLM output was not valid JSON; recovered function name by scan"
            );
            return Ok(LlmSelection {
                lambda_function: function,
                parameters: Value::Object(serde_json::Map::new()),
                reasoning: String::new(),
            });
        }
    }

    Err(AgentError::Parse(
        "LLM response carried no valid selection".to_string(),
    ))
}

fn selection_from_object(value: &Value) -> Option<LlmSelection> {
    let name = value.get("lambda_function")?.as_str()?;
    let lambda_function = LambdaFunction::parse(name)?;
    Some(LlmSelection {
        lambda_function,
        parameters: value
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        reasoning: value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Build the base selection prompt: alert details, the function catalog,
/// worked examples, and the structured-output instruction.
#[must_use]
pub fn selection_prompt(alert: &Alert, rag_section: &str, few_shot_section: &str) -> String {
    let mut prompt = String::new();

    if !few_shot_section.is_empty() {
        prompt.push_str(few_shot_section);
        prompt.push('\n');
    }

    prompt.push_str(
        "You are an SRE agent analyzing a Prometheus alert to select the appropriate remediation action.\n\n",
    );
    prompt.push_str("Alert Details:\n");
    prompt.push_str(&format!("- Alert Name: {}\n", alert.name()));
    prompt.push_str(&format!(
        "- Labels: {}\n",
        serde_json::to_string(&alert.labels).unwrap_or_default()
    ));
    prompt.push_str(&format!(
        "- Annotations: {}\n\n",
        serde_json::to_string(&alert.merged_annotations()).unwrap_or_default()
    ));

    prompt.push_str("Available Lambda Functions:\n");
    for (index, function) in LambdaFunction::ALL.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {}: {}\n",
            index + 1,
            function,
            function.description()
        ));
    }

    prompt.push_str("\nExamples:\n\n");
    prompt.push_str("Example 1:\n");
    prompt.push_str("Alert: FluxReconciliationFailure\n");
    prompt.push_str(
        "Labels: {\"name\": \"homepage\", \"namespace\": \"flux-system\", \"kind\": \"Kustomization\"}\n",
    );
    prompt.push_str("Selection: flux-reconcile-kustomization\n");
    prompt.push_str("Parameters: {\"name\": \"homepage\", \"namespace\": \"flux-system\"}\n\n");
    prompt.push_str("Example 2:\n");
    prompt.push_str("Alert: PodCrashLooping\n");
    prompt.push_str("Labels: {\"pod\": \"app-abc123\", \"namespace\": \"production\"}\n");
    prompt.push_str("Selection: pod-restart\n");
    prompt.push_str(
        "Parameters: {\"name\": \"app-abc123\", \"namespace\": \"production\", \"type\": \"pod\"}\n\n",
    );
    prompt.push_str("Example 3:\n");
    prompt.push_str("Alert: DeploymentReplicasMismatch\n");
    prompt.push_str(
        "Labels: {\"deployment\": \"api-server\", \"namespace\": \"production\", \"expected\": \"3\"}\n",
    );
    prompt.push_str("Selection: scale-deployment\n");
    prompt.push_str(
        "Parameters: {\"name\": \"api-server\", \"namespace\": \"production\", \"replicas\": 3}\n",
    );

    prompt.push_str(rag_section);

    prompt.push_str(
        "\nIMPORTANT: Respond with ONLY a valid JSON object in this exact format:\n",
    );
    prompt.push_str("{\n  \"lambda_function\": \"<function-name>\",\n  \"parameters\": {\"name\": \"<resource-name>\", \"namespace\": \"<namespace>\"},\n  \"reasoning\": \"<explanation>\"\n}\n");

    prompt
}
