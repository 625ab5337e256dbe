//! The remediation workflow engine.
//!
//! A typed state machine drives each alert through extract → select →
//! (approve) → execute → verify → complete. The full state record is
//! checkpointed after every transition, keyed by correlation ID, so a
//! crashed workflow resumes from its last persisted step and a replayed
//! event is idempotent with respect to already-executed lambda calls.

use approvals::{
    ApprovalManager, ApprovalProvider, ApprovalRequest, ApprovalStatus, TimeoutAction,
};
use notify::{Notifier, NotifyEvent};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use agent_memory::DomainMemoryManager;

use crate::alert::Alert;
use crate::cloudevent::CloudEvent;
use crate::config::{AgentConfig, OperationMode};
use crate::few_shot::ExampleDatabase;
use crate::lambda::{InvocationResult, LambdaInvoker};
use crate::observability::RemediationGuard;
use crate::rag::RemediationRag;
use crate::selection::{RemediationSelector, SelectionMethod};

const APPROVAL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const RETRY_BASE_SECONDS: f64 = 1.0;
const RETRY_FACTOR: f64 = 2.0;
const RETRY_JITTER: f64 = 0.2;

/// Steps of the remediation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    ReceiveCloudevent,
    ExtractFromCloudevent,
    ExtractLambdaFunction,
    RequestApproval,
    WaitForApproval,
    ExecuteLambdaFunction,
    VerifyRemediation,
    Complete,
}

/// Approval settings captured into the state record when the gate is
/// entered, so a resumed workflow applies the same policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSettings {
    pub providers: Vec<ApprovalProvider>,
    pub require_all: bool,
    pub timeout_seconds: u64,
    pub timeout_action: TimeoutAction,
}

/// Outcome of the verification step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub alert_resolved: bool,
}

/// Type-safe workflow state, checkpointed on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    // CloudEvent data
    pub event_data: Value,
    pub event_type: String,
    pub event_id: Option<String>,
    pub correlation_id: String,

    // Alert information
    pub alertname: Option<String>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub common_annotations: HashMap<String, String>,

    // Selected remediation
    pub lambda_function: Option<String>,
    pub lambda_parameters: HashMap<String, Value>,

    // Operation mode
    pub operation_mode: OperationMode,

    // Approval state
    pub approval_request_id: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
    pub approval_config: Option<ApprovalSettings>,

    // Execution results
    pub remediation_result: Option<InvocationResult>,
    pub verification_result: Option<VerificationResult>,
    pub success: bool,

    // Confidence and method tracking
    pub confidence: f64,
    pub method: Option<SelectionMethod>,
    pub reasoning: Option<String>,

    // Error handling
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,

    pub step: WorkflowStep,
}

impl AgentState {
    fn new(event: &CloudEvent, correlation_id: &str, config: &AgentConfig) -> Self {
        Self {
            event_data: event.data.clone(),
            event_type: event.event_type.clone(),
            event_id: Some(event.id.clone()),
            correlation_id: correlation_id.to_string(),
            alertname: None,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            common_annotations: HashMap::new(),
            lambda_function: None,
            lambda_parameters: HashMap::new(),
            operation_mode: config.operation_mode,
            approval_request_id: None,
            approval_status: None,
            approval_config: None,
            remediation_result: None,
            verification_result: None,
            success: false,
            confidence: 0.0,
            method: None,
            reasoning: None,
            error: None,
            retry_count: 0,
            max_retries: config.max_retries,
            step: WorkflowStep::ReceiveCloudevent,
        }
    }

    /// Rebuild the alert view from the extracted state fields.
    fn alert(&self) -> Alert {
        Alert {
            alertname: self.alertname.clone(),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            common_annotations: self.common_annotations.clone(),
            ..Alert::default()
        }
    }

    fn alertname(&self) -> &str {
        self.alertname.as_deref().unwrap_or("unknown")
    }

    fn fail(&mut self, error: &str) {
        self.error = Some(error.to_string());
        self.success = false;
        self.step = WorkflowStep::Complete;
    }
}

/// Drives a workflow per alert. The engine owns the `AgentState` for a
/// correlation ID from the first event until completion.
pub struct WorkflowEngine {
    config: AgentConfig,
    selector: Arc<RemediationSelector>,
    invoker: Arc<LambdaInvoker>,
    approvals: Option<Arc<ApprovalManager>>,
    memory: Arc<DomainMemoryManager>,
    notifier: Arc<Notifier>,
    rag: Arc<RemediationRag>,
    examples: Arc<ExampleDatabase>,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: AgentConfig,
        selector: Arc<RemediationSelector>,
        invoker: Arc<LambdaInvoker>,
        approvals: Option<Arc<ApprovalManager>>,
        memory: Arc<DomainMemoryManager>,
        notifier: Arc<Notifier>,
        rag: Arc<RemediationRag>,
        examples: Arc<ExampleDatabase>,
    ) -> Self {
        Self {
            config,
            selector,
            invoker,
            approvals,
            memory,
            notifier,
            rag,
            examples,
        }
    }

    /// Run the workflow for an alert event. A correlation ID that already
    /// completed returns the stored state without re-invoking anything;
    /// an interrupted one resumes from its last checkpoint.
    pub async fn run(&self, event: &CloudEvent, correlation_id: &str) -> AgentState {
        if let Ok(Some(value)) = self.memory.get_workflow_state(correlation_id).await {
            if let Ok(state) = serde_json::from_value::<AgentState>(value) {
                if state.step == WorkflowStep::Complete {
                    info!(
                        correlation_id,
                        alertname = state.alertname(),
                        "workflow already complete, returning checkpointed state"
                    );
                    return state;
                }
                info!(
                    correlation_id,
                    step = ?state.step,
                    "resuming workflow from checkpoint"
                );
                return self.drive(state).await;
            }
        }

        let state = AgentState::new(event, correlation_id, &self.config);
        self.drive(state).await
    }

    async fn drive(&self, mut state: AgentState) -> AgentState {
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.config.workflow_budget,
            self.step_loop(&mut state),
        )
        .await;
        if outcome.is_err() {
            warn!(
                correlation_id = %state.correlation_id,
                step = ?state.step,
                "workflow budget exceeded"
            );
            state.fail("workflow_timeout");
        }

        self.finalize(&mut state, started).await;
        state
    }

    async fn step_loop(&self, state: &mut AgentState) {
        loop {
            self.checkpoint(state).await;
            debug!(
                correlation_id = %state.correlation_id,
                step = ?state.step,
                "workflow step"
            );

            match state.step {
                WorkflowStep::ReceiveCloudevent => {
                    state.step = WorkflowStep::ExtractFromCloudevent;
                }
                WorkflowStep::ExtractFromCloudevent => self.extract(state).await,
                WorkflowStep::ExtractLambdaFunction => self.select(state).await,
                WorkflowStep::RequestApproval => self.request_approval(state).await,
                WorkflowStep::WaitForApproval => self.wait_for_approval(state).await,
                WorkflowStep::ExecuteLambdaFunction => self.execute(state).await,
                WorkflowStep::VerifyRemediation => Self::verify(state),
                WorkflowStep::Complete => break,
            }
        }
    }

    /// Extract alert fields from the event payload. Static
    /// `lambda_function` annotations are the fast path: they map the alert
    /// 1:1 onto its remediation with full confidence.
    async fn extract(&self, state: &mut AgentState) {
        let alert = Alert::from_event_data(&state.event_data);

        state.alertname = Some(alert.name().to_string());
        state.labels = alert.labels.clone();
        state.annotations = alert.annotations.clone();
        state.common_annotations = alert.common_annotations.clone();

        let merged = alert.merged_annotations();
        if let Some(lambda_function) = merged.get("lambda_function") {
            state.lambda_function = Some(lambda_function.clone());
            state.lambda_parameters = merged
                .get("lambda_parameters")
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();
            state.method = Some(SelectionMethod::StaticAnnotation);
            state.confidence = 1.0;
        }

        // Task schema for this pass; resumed correlation IDs reuse theirs.
        let request = format!("Remediate alert {}", state.alertname());
        if let Err(error) = self
            .memory
            .factory()
            .get_or_create(&state.correlation_id, &request, None)
            .await
        {
            warn!(
                correlation_id = %state.correlation_id,
                %error,
                "task schema initialization failed"
            );
        }

        info!(
            correlation_id = %state.correlation_id,
            alertname = state.alertname(),
            has_lambda_function = state.lambda_function.is_some(),
            "cloudevent extracted"
        );

        state.step = WorkflowStep::ExtractLambdaFunction;
    }

    /// Select a remediation, then route to the approval gate in
    /// supervised mode or straight to execution in agentic mode.
    async fn select(&self, state: &mut AgentState) {
        if state.lambda_function.is_none() {
            let alert = state.alert();
            match self.selector.select(&alert).await {
                Some(selection) => {
                    state.lambda_function = Some(selection.lambda_function.as_str().to_string());
                    state.lambda_parameters = selection.parameters;
                    state.method = Some(selection.method);
                    state.confidence = selection.confidence;
                    state.reasoning = Some(selection.reasoning);

                    info!(
                        correlation_id = %state.correlation_id,
                        alertname = state.alertname(),
                        lambda_function = state.lambda_function.as_deref(),
                        method = selection.method.as_str(),
                        confidence = state.confidence,
                        "lambda function selected"
                    );
                }
                None => {
                    error!(
                        correlation_id = %state.correlation_id,
                        alertname = state.alertname(),
                        "selection failed"
                    );
                    state.fail("selection_failed");
                    return;
                }
            }
        }

        state.step = match state.operation_mode {
            OperationMode::Supervised => WorkflowStep::RequestApproval,
            OperationMode::Agentic => WorkflowStep::ExecuteLambdaFunction,
        };
    }

    async fn request_approval(&self, state: &mut AgentState) {
        let Some(manager) = &self.approvals else {
            // Supervised mode without an approval manager rejects by default.
            state.fail("Approval required but approval manager not available");
            return;
        };
        let Some(lambda_function) = state.lambda_function.clone() else {
            state.fail("No lambda_function to request approval for");
            return;
        };

        let providers = manager.configured_providers();
        if providers.is_empty() {
            state.fail("Approval required but no approval providers configured");
            return;
        }

        let settings = ApprovalSettings {
            providers: providers.clone(),
            require_all: self.config.approval_require_all,
            timeout_seconds: self.config.approval_timeout_seconds,
            timeout_action: self.config.approval_timeout_action,
        };

        let request = ApprovalRequest::new("agent-sre", "execute_lambda_function", providers)
            .with_lambda(&lambda_function, state.lambda_parameters.clone())
            .with_alert(state.alertname(), &state.correlation_id)
            .with_require_all(settings.require_all)
            .with_timeout(settings.timeout_seconds, settings.timeout_action);

        let stored = manager.request_approval(request).await;

        if stored.status == ApprovalStatus::Rejected {
            state.approval_request_id = Some(stored.request_id);
            state.approval_status = Some(ApprovalStatus::Rejected);
            state.fail("Approval request could not be delivered");
            return;
        }

        info!(
            correlation_id = %state.correlation_id,
            request_id = %stored.request_id,
            lambda_function = %lambda_function,
            "approval requested"
        );

        self.notifier.notify(NotifyEvent::ApprovalPending {
            alertname: state.alertname().to_string(),
            lambda_function,
            request_id: stored.request_id.clone(),
            correlation_id: state.correlation_id.clone(),
            timestamp: chrono::Utc::now(),
        });

        state.approval_request_id = Some(stored.request_id);
        state.approval_status = Some(ApprovalStatus::Pending);
        state.approval_config = Some(settings);
        state.step = WorkflowStep::WaitForApproval;
    }

    /// Poll the approval manager until the request leaves `pending`. The
    /// overall workflow budget bounds the wait.
    async fn wait_for_approval(&self, state: &mut AgentState) {
        let (Some(manager), Some(request_id)) =
            (&self.approvals, state.approval_request_id.clone())
        else {
            state.fail("Approval request ID or manager not available");
            return;
        };

        loop {
            manager.check_timeouts().await;

            let Some(request) = manager.get_request(&request_id).await else {
                state.fail(&format!("Approval request {request_id} not found"));
                return;
            };

            match request.status {
                ApprovalStatus::Pending => {
                    tokio::time::sleep(APPROVAL_POLL_INTERVAL).await;
                }
                ApprovalStatus::Approved => {
                    info!(
                        correlation_id = %state.correlation_id,
                        request_id = %request_id,
                        "approval granted"
                    );
                    state.approval_status = Some(ApprovalStatus::Approved);
                    state.step = WorkflowStep::ExecuteLambdaFunction;
                    return;
                }
                ApprovalStatus::Rejected => {
                    state.approval_status = Some(ApprovalStatus::Rejected);
                    // Distinguish an operator rejection from a timeout policy.
                    if request.is_expired(chrono::Utc::now())
                        && request.timeout_action == TimeoutAction::Reject
                    {
                        state.fail("Approval request timed out (rejected)");
                    } else {
                        state.fail("Approval rejected by operator");
                    }
                    return;
                }
                ApprovalStatus::Timeout => {
                    warn!(
                        correlation_id = %state.correlation_id,
                        request_id = %request_id,
                        "approval timed out"
                    );
                    state.approval_status = Some(ApprovalStatus::Timeout);
                    state.fail("Approval request timed out (pending)");
                    return;
                }
                ApprovalStatus::Cancelled => {
                    state.approval_status = Some(ApprovalStatus::Cancelled);
                    state.fail("Approval request cancelled");
                    return;
                }
            }
        }
    }

    async fn execute(&self, state: &mut AgentState) {
        let Some(lambda_function) = state.lambda_function.clone() else {
            state.fail("No lambda_function to execute");
            return;
        };

        ensure_parameters(&mut state.lambda_parameters, &state.labels);

        loop {
            let mut guard = RemediationGuard::new(state.alertname(), &lambda_function);

            info!(
                correlation_id = %state.correlation_id,
                alertname = state.alertname(),
                lambda_function = %lambda_function,
                retry_count = state.retry_count,
                "executing lambda function"
            );

            let result = self
                .invoker
                .invoke(
                    &lambda_function,
                    &state.lambda_parameters,
                    &state.correlation_id,
                )
                .await;

            if result.is_success() {
                guard.succeed();
                state.remediation_result = Some(result);
                state.step = WorkflowStep::VerifyRemediation;
                return;
            }

            let cannot_fix = result.cannot_fix;
            let message = result.message.clone();
            state.remediation_result = Some(result);
            drop(guard);

            if cannot_fix {
                error!(
                    correlation_id = %state.correlation_id,
                    lambda_function = %lambda_function,
                    "remediation target unreachable, cannot fix"
                );
                state.fail(&message);
                return;
            }

            if state.retry_count >= state.max_retries {
                error!(
                    correlation_id = %state.correlation_id,
                    lambda_function = %lambda_function,
                    retry_count = state.retry_count,
                    "retry budget exhausted"
                );
                state.fail(&message);
                return;
            }

            state.retry_count += 1;
            let delay = retry_backoff(state.retry_count);
            warn!(
                correlation_id = %state.correlation_id,
                lambda_function = %lambda_function,
                retry_count = state.retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "retrying lambda invocation"
            );
            self.checkpoint(state).await;
            tokio::time::sleep(delay).await;
        }
    }

    /// Verification trusts the lambda's reported status. A richer
    /// verifier can re-query metrics here without changing the contract:
    /// `success := verification_result.verified`.
    fn verify(state: &mut AgentState) {
        let verified = state
            .remediation_result
            .as_ref()
            .is_some_and(InvocationResult::is_success);

        state.verification_result = Some(VerificationResult {
            verified,
            alert_resolved: verified,
        });
        state.success = verified;

        info!(
            correlation_id = %state.correlation_id,
            alertname = state.alertname(),
            success = state.success,
            "remediation verified"
        );

        state.step = WorkflowStep::Complete;
    }

    /// Terminal bookkeeping: final checkpoint, training data, task schema
    /// transitions, and notifications.
    async fn finalize(&self, state: &mut AgentState, started: Instant) {
        state.step = WorkflowStep::Complete;
        self.checkpoint(state).await;

        let executed = state.remediation_result.is_some();
        if executed {
            if let Some(lambda_function) = &state.lambda_function {
                let alert = state.alert();
                self.examples
                    .add_example(
                        state.alertname(),
                        state.labels.clone(),
                        lambda_function,
                        state.lambda_parameters.clone(),
                        state.success,
                        state.reasoning.as_deref(),
                    )
                    .await;
                self.rag
                    .index_alert(
                        &alert,
                        Some(lambda_function),
                        Some(&state.lambda_parameters),
                        Some(state.success),
                    )
                    .await;
            }
        }

        // Close out the task schema for this correlation ID.
        match self.memory.get_task(Some(&state.correlation_id), None).await {
            Ok(Some(mut schema)) => {
                let outcome = if state.success {
                    format!(
                        "Remediated {} via {}",
                        state.alertname(),
                        state.lambda_function.as_deref().unwrap_or("none")
                    )
                } else {
                    state.error.clone().unwrap_or_else(|| "failed".to_string())
                };
                let result = if state.success {
                    self.memory
                        .complete_task(&mut schema, &outcome, true, &[])
                        .await
                } else {
                    self.memory.fail_task(&mut schema, &outcome, false).await
                };
                if let Err(error) = result {
                    warn!(
                        correlation_id = %state.correlation_id,
                        %error,
                        "task schema completion failed"
                    );
                }
            }
            Ok(None) => {}
            Err(error) => warn!(
                correlation_id = %state.correlation_id,
                %error,
                "task schema lookup failed"
            ),
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Err(error) = self
            .memory
            .record_task_completion(
                &state.correlation_id,
                &format!(
                    "{} -> {}",
                    state.alertname(),
                    state.lambda_function.as_deref().unwrap_or("none")
                ),
                state.success,
                duration_ms,
                &[],
            )
            .await
        {
            warn!(
                correlation_id = %state.correlation_id,
                %error,
                "task completion record failed"
            );
        }

        let cannot_fix = state
            .remediation_result
            .as_ref()
            .is_some_and(|r| r.cannot_fix);

        if state.success {
            if let Some(lambda_function) = &state.lambda_function {
                self.notifier.notify(NotifyEvent::RemediationCompleted {
                    alertname: state.alertname().to_string(),
                    lambda_function: lambda_function.clone(),
                    correlation_id: state.correlation_id.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
        } else if cannot_fix {
            self.notifier.notify(NotifyEvent::CannotFix {
                alertname: state.alertname().to_string(),
                lambda_function: state
                    .lambda_function
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                correlation_id: state.correlation_id.clone(),
                reason: state.error.clone().unwrap_or_default(),
                timestamp: chrono::Utc::now(),
            });
        } else {
            self.notifier.notify(NotifyEvent::RemediationFailed {
                alertname: state.alertname().to_string(),
                lambda_function: state.lambda_function.clone(),
                correlation_id: state.correlation_id.clone(),
                error: state.error.clone().unwrap_or_default(),
                retry_count: state.retry_count,
                timestamp: chrono::Utc::now(),
            });
        }

        info!(
            correlation_id = %state.correlation_id,
            alertname = state.alertname(),
            success = state.success,
            lambda_function = state.lambda_function.as_deref(),
            method = state.method.map(SelectionMethod::as_str),
            error = state.error.as_deref(),
            "workflow completed"
        );
    }

    async fn checkpoint(&self, state: &AgentState) {
        match serde_json::to_value(state) {
            Ok(value) => {
                if let Err(error) = self
                    .memory
                    .save_workflow_state(&state.correlation_id, value)
                    .await
                {
                    warn!(
                        correlation_id = %state.correlation_id,
                        %error,
                        "workflow checkpoint failed"
                    );
                }
            }
            Err(error) => warn!(
                correlation_id = %state.correlation_id,
                %error,
                "workflow state serialization failed"
            ),
        }
    }
}

/// Deterministic parameter defaulting applied at the execute step.
fn ensure_parameters(parameters: &mut HashMap<String, Value>, labels: &HashMap<String, String>) {
    if !parameters.contains_key("name") {
        let name = ["name", "resource_name", "pod", "deployment"]
            .iter()
            .find_map(|key| labels.get(*key).map(String::as_str))
            .unwrap_or("unknown");
        parameters.insert("name".to_string(), Value::String(name.to_string()));
    }
    if !parameters.contains_key("namespace") {
        let namespace = ["namespace", "resource_namespace"]
            .iter()
            .find_map(|key| labels.get(*key).map(String::as_str))
            .unwrap_or("flux-system");
        parameters.insert(
            "namespace".to_string(),
            Value::String(namespace.to_string()),
        );
    }
}

/// Exponential backoff with ±20% jitter: 1s base, doubling per attempt.
fn retry_backoff(retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(16);
    let base = RETRY_BASE_SECONDS * RETRY_FACTOR.powi(exponent as i32);
    let jitter = {
        let mut rng = rand::thread_rng();
        rng.gen_range(-RETRY_JITTER..=RETRY_JITTER)
    };
    Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_parameters_fallback_chain() {
        let labels = HashMap::from([
            ("pod".to_string(), "api-abc123".to_string()),
            ("resource_namespace".to_string(), "production".to_string()),
        ]);
        let mut parameters = HashMap::new();
        ensure_parameters(&mut parameters, &labels);
        assert_eq!(parameters["name"], "api-abc123");
        assert_eq!(parameters["namespace"], "production");
    }

    #[test]
    fn test_ensure_parameters_defaults() {
        let mut parameters = HashMap::new();
        ensure_parameters(&mut parameters, &HashMap::new());
        assert_eq!(parameters["name"], "unknown");
        assert_eq!(parameters["namespace"], "flux-system");
    }

    #[test]
    fn test_ensure_parameters_keeps_existing() {
        let labels = HashMap::from([("pod".to_string(), "other".to_string())]);
        let mut parameters =
            HashMap::from([("name".to_string(), json!("explicit"))]);
        ensure_parameters(&mut parameters, &labels);
        assert_eq!(parameters["name"], "explicit");
    }

    #[test]
    fn test_retry_backoff_grows_with_jitter_bounds() {
        for retry in 1..=4u32 {
            let expected = RETRY_BASE_SECONDS * RETRY_FACTOR.powi(retry as i32 - 1);
            let delay = retry_backoff(retry).as_secs_f64();
            assert!(delay >= expected * 0.8 - 1e-9, "retry {retry}: {delay}");
            assert!(delay <= expected * 1.2 + 1e-9, "retry {retry}: {delay}");
        }
    }

    #[test]
    fn test_state_serialization_round_trip() {
        let event = CloudEvent::new(
            crate::cloudevent::ALERT_FIRED,
            "prometheus",
            "evt-1",
            json!({ "labels": { "alertname": "PodCrashLooping" } }),
        );
        let state = AgentState::new(&event, "corr-1", &AgentConfig::default());

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["step"], "receive_cloudevent");
        let decoded: AgentState = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.step, WorkflowStep::ReceiveCloudevent);
        assert_eq!(decoded.correlation_id, "corr-1");
        assert_eq!(decoded.max_retries, 3);
    }
}
