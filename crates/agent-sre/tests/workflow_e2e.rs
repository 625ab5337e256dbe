//! End-to-end workflow scenarios against mock lambda endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agent_memory::{DomainMemoryManager, MemoryConfig};
use agent_sre::cloudevent::{CloudEvent, ALERT_FIRED};
use agent_sre::config::{AgentConfig, OperationMode};
use agent_sre::few_shot::ExampleDatabase;
use agent_sre::lambda::LambdaInvoker;
use agent_sre::rag::RemediationRag;
use agent_sre::selection::{
    LlmClient, RecursiveReasoner, RemediationSelector, SelectionMethod,
};
use agent_sre::workflow::{WorkflowEngine, WorkflowStep};
use approvals::{
    ApprovalChannel, ApprovalDecision, ApprovalError, ApprovalManager, ApprovalProvider,
    ApprovalRequest, TimeoutAction,
};
use notify::{Notifier, TicketChannel};

/// Approval channel double that records the request IDs it saw.
struct RecordingChannel {
    seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingChannel {
    fn new() -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(Self {
                seen: Arc::clone(&seen),
            }),
            seen,
        )
    }
}

#[async_trait]
impl ApprovalChannel for RecordingChannel {
    fn provider(&self) -> ApprovalProvider {
        ApprovalProvider::Slack
    }

    async fn send(&self, request: &ApprovalRequest) -> Result<Value, ApprovalError> {
        self.seen.lock().await.push(request.request_id.clone());
        Ok(json!({ "status": "sent" }))
    }
}

struct Harness {
    engine: Arc<WorkflowEngine>,
    memory: Arc<DomainMemoryManager>,
    examples: Arc<ExampleDatabase>,
}

async fn harness(
    config: AgentConfig,
    lambda_base: &str,
    approvals: Option<Arc<ApprovalManager>>,
    notifier: Notifier,
) -> Harness {
    let memory_config = MemoryConfig {
        agent_id: "agent-sre".to_string(),
        agent_type: "sre".to_string(),
        domain: "sre".to_string(),
        fast_url: None,
        durable_url: None,
    };
    let memory = Arc::new(DomainMemoryManager::new(&memory_config));
    memory.connect().await.unwrap();

    let rag = Arc::new(RemediationRag::with_hash_embedder());
    let examples = Arc::new(ExampleDatabase::in_memory());

    let selector = Arc::new(RemediationSelector::new(
        RecursiveReasoner::new(&config.reasoner_url, config.trm_model_path.clone()),
        LlmClient::new(config.llm_url.clone()),
        Arc::clone(&rag),
        Arc::clone(&examples),
    ));
    let invoker = Arc::new(LambdaInvoker::new(&config.lambda_namespace).with_base_url(lambda_base));

    let engine = Arc::new(WorkflowEngine::new(
        config,
        selector,
        invoker,
        approvals,
        Arc::clone(&memory),
        Arc::new(notifier),
        rag,
        Arc::clone(&examples),
    ));

    Harness {
        engine,
        memory,
        examples,
    }
}

fn fired_event(id: &str, data: Value) -> CloudEvent {
    CloudEvent::new(ALERT_FIRED, "prometheus", id, data)
}

async fn mount_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// S1: static annotation happy path, plus idempotent replay of the same
/// correlation ID.
#[tokio::test]
async fn s1_static_annotation_happy_path() {
    let lambda = MockServer::start().await;
    mount_healthy(&lambda).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("X-Correlation-ID", "corr-s1"))
        .and(body_partial_json(json!({
            "name": "homepage",
            "namespace": "flux-system"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "reconciled"
        })))
        .expect(1)
        .mount(&lambda)
        .await;

    let harness = harness(
        AgentConfig::default(),
        &lambda.uri(),
        None,
        Notifier::disabled(),
    )
    .await;

    let event = fired_event(
        "corr-s1",
        json!({
            "labels": {
                "alertname": "FluxReconciliationFailure",
                "name": "homepage",
                "namespace": "flux-system"
            },
            "annotations": {
                "lambda_function": "flux-reconcile-kustomization",
                "lambda_parameters": "{}"
            }
        }),
    );

    let state = harness.engine.run(&event, "corr-s1").await;

    assert_eq!(state.step, WorkflowStep::Complete);
    assert!(state.success);
    assert_eq!(state.method, Some(SelectionMethod::StaticAnnotation));
    assert!((state.confidence - 1.0).abs() < 1e-9);
    assert_eq!(
        state.lambda_function.as_deref(),
        Some("flux-reconcile-kustomization")
    );
    assert_eq!(state.lambda_parameters["name"], "homepage");
    assert_eq!(state.lambda_parameters["namespace"], "flux-system");

    // A remediation example was recorded for training.
    assert_eq!(harness.examples.len().await, 1);

    // Replaying the same correlation ID is idempotent: the checkpointed
    // state is returned and the lambda is not invoked again (the mock
    // expectation of exactly one call verifies this on drop).
    let replay = harness.engine.run(&event, "corr-s1").await;
    assert!(replay.success);
    assert_eq!(harness.examples.len().await, 1);
}

/// S2: no annotation, no history; the mocked LLM picks pod-restart.
#[tokio::test]
async fn s2_ai_selection_path() {
    let lambda = MockServer::start().await;
    mount_healthy(&lambda).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({
            "name": "api-abc123",
            "namespace": "production",
            "type": "pod"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "restarted"
        })))
        .expect(1)
        .mount(&lambda)
        .await;

    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lambda_function": "pod-restart",
            "parameters": {
                "name": "api-abc123",
                "namespace": "production",
                "type": "pod"
            },
            "reasoning": "Pod is in a crash loop; restarting clears transient failures."
        })))
        .expect(1)
        .mount(&llm)
        .await;

    let config = AgentConfig {
        llm_url: Some(llm.uri()),
        ..AgentConfig::default()
    };
    let harness = harness(config, &lambda.uri(), None, Notifier::disabled()).await;

    let event = fired_event(
        "corr-s2",
        json!({
            "labels": {
                "alertname": "PodCrashLooping",
                "pod": "api-abc123",
                "namespace": "production"
            }
        }),
    );

    let state = harness.engine.run(&event, "corr-s2").await;

    assert!(state.success);
    assert_eq!(state.method, Some(SelectionMethod::AiFunctionCalling));
    assert_eq!(state.lambda_function.as_deref(), Some("pod-restart"));
    assert_eq!(state.lambda_parameters["type"], "pod");
    assert!(
        state.confidence >= 0.5 && state.confidence <= 0.9,
        "confidence {} outside [0.5, 0.9]",
        state.confidence
    );
}

/// S3: supervised mode waits for the approval callback, then proceeds.
#[tokio::test]
async fn s3_supervised_mode_approved() {
    let lambda = MockServer::start().await;
    mount_healthy(&lambda).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "reconciled"
        })))
        .expect(1)
        .mount(&lambda)
        .await;

    let (channel, seen) = RecordingChannel::new();
    let manager = Arc::new(ApprovalManager::with_channels(vec![channel]));

    let config = AgentConfig {
        operation_mode: OperationMode::Supervised,
        ..AgentConfig::default()
    };
    let harness = harness(
        config,
        &lambda.uri(),
        Some(Arc::clone(&manager)),
        Notifier::disabled(),
    )
    .await;

    let event = fired_event(
        "corr-s3",
        json!({
            "labels": {
                "alertname": "FluxReconciliationFailure",
                "name": "homepage",
                "namespace": "flux-system"
            },
            "annotations": {
                "lambda_function": "flux-reconcile-kustomization",
                "lambda_parameters": "{}"
            }
        }),
    );

    let engine = Arc::clone(&harness.engine);
    let run = tokio::spawn(async move { engine.run(&event, "corr-s3").await });

    // Wait until the approval request is out, then approve it.
    let request_id = loop {
        if let Some(id) = seen.lock().await.first().cloned() {
            break id;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    manager
        .handle_response(&ApprovalDecision {
            request_id,
            provider: ApprovalProvider::Slack,
            decision: "approve".to_string(),
            user_id: Some("U1".to_string()),
            user_name: Some("oncall".to_string()),
            timestamp: None,
        })
        .await
        .expect("approval request should exist");

    let state = run.await.unwrap();
    assert!(state.success);
    assert_eq!(
        state.approval_status,
        Some(approvals::ApprovalStatus::Approved)
    );
}

/// S4: supervised mode with a 1s timeout and reject-on-timeout policy.
#[tokio::test]
async fn s4_supervised_timeout_rejects() {
    let lambda = MockServer::start().await;
    mount_healthy(&lambda).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&lambda)
        .await;

    let (channel, _seen) = RecordingChannel::new();
    let manager = Arc::new(ApprovalManager::with_channels(vec![channel]));

    let config = AgentConfig {
        operation_mode: OperationMode::Supervised,
        approval_timeout_seconds: 1,
        approval_timeout_action: TimeoutAction::Reject,
        ..AgentConfig::default()
    };
    let harness = harness(config, &lambda.uri(), Some(manager), Notifier::disabled()).await;

    let event = fired_event(
        "corr-s4",
        json!({
            "labels": { "alertname": "FluxReconciliationFailure", "name": "homepage" },
            "annotations": {
                "lambda_function": "flux-reconcile-kustomization",
                "lambda_parameters": "{}"
            }
        }),
    );

    let state = harness.engine.run(&event, "corr-s4").await;

    assert!(!state.success);
    let error = state.error.expect("terminal error");
    assert!(error.contains("timed out"), "error was: {error}");
}

/// S5: the lambda's health probe fails; no invocation is attempted and a
/// failure ticket goes out.
#[tokio::test]
async fn s5_lambda_unreachable_cannot_fix() {
    let tickets = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "severity": "Critical" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&tickets)
        .await;

    let notifier =
        Notifier::with_channels(vec![Arc::new(TicketChannel::new(tickets.uri()))]);

    // Nothing listens on port 1: the health probe gets connection refused.
    let harness = harness(
        AgentConfig::default(),
        "http://127.0.0.1:1",
        None,
        notifier,
    )
    .await;

    let event = fired_event(
        "corr-s5",
        json!({
            "labels": {
                "alertname": "FluxReconciliationFailure",
                "name": "homepage",
                "namespace": "flux-system"
            },
            "annotations": {
                "lambda_function": "flux-reconcile-kustomization",
                "lambda_parameters": "{}"
            }
        }),
    );

    let state = harness.engine.run(&event, "corr-s5").await;

    assert!(!state.success);
    let result = state.remediation_result.expect("remediation result");
    assert!(result.cannot_fix);
    assert_eq!(state.retry_count, 0);

    // Ticket delivery is fire-and-forget; give the spawned send a moment
    // before the mock's expectation is verified on drop.
    tokio::time::sleep(Duration::from_millis(300)).await;
}

/// S6: the first invocation reports a transient error, the second
/// succeeds. Exactly two invocations, one recorded retry.
#[tokio::test]
async fn s6_retry_on_transient_error() {
    let lambda = MockServer::start().await;
    mount_healthy(&lambda).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "HTTP 503"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&lambda)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "restarted"
        })))
        .expect(1)
        .mount(&lambda)
        .await;

    let harness = harness(
        AgentConfig::default(),
        &lambda.uri(),
        None,
        Notifier::disabled(),
    )
    .await;

    let event = fired_event(
        "corr-s6",
        json!({
            "labels": {
                "alertname": "PodCrashLooping",
                "pod": "api-abc123",
                "namespace": "production"
            },
            "annotations": {
                "lambda_function": "pod-restart",
                "lambda_parameters": "{}"
            }
        }),
    );

    let state = harness.engine.run(&event, "corr-s6").await;

    assert!(state.success);
    assert_eq!(state.retry_count, 1);

    // The selection was indexed with its verified outcome.
    assert_eq!(harness.examples.len().await, 1);
    let recorded = harness
        .examples
        .find_similar_examples(
            "PodCrashLooping",
            &HashMap::from([("alertname".to_string(), "PodCrashLooping".to_string())]),
            1,
            0.0,
            true,
        )
        .await;
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].success);
}

/// Selection failure is terminal with no retry and no lambda traffic.
#[tokio::test]
async fn selection_failure_is_terminal() {
    let lambda = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&lambda)
        .await;

    let harness = harness(
        AgentConfig::default(),
        &lambda.uri(),
        None,
        Notifier::disabled(),
    )
    .await;

    let event = fired_event(
        "corr-nofn",
        json!({ "labels": { "alertname": "UnmappableAlert" } }),
    );

    let state = harness.engine.run(&event, "corr-nofn").await;

    assert!(!state.success);
    assert_eq!(state.error.as_deref(), Some("selection_failed"));
    assert_eq!(state.retry_count, 0);
}

/// After completion, exactly one workflow state exists for the
/// correlation ID and its step is complete.
#[tokio::test]
async fn workflow_state_checkpointed_by_correlation_id() {
    let lambda = MockServer::start().await;
    mount_healthy(&lambda).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "ok"
        })))
        .mount(&lambda)
        .await;

    let harness = harness(
        AgentConfig::default(),
        &lambda.uri(),
        None,
        Notifier::disabled(),
    )
    .await;

    let event = fired_event(
        "corr-ckpt",
        json!({
            "labels": { "alertname": "FluxReconciliationFailure", "name": "homepage" },
            "annotations": {
                "lambda_function": "flux-reconcile-kustomization",
                "lambda_parameters": "{}"
            }
        }),
    );

    harness.engine.run(&event, "corr-ckpt").await;

    let checkpoint = harness
        .memory
        .get_workflow_state("corr-ckpt")
        .await
        .unwrap()
        .expect("checkpoint exists");
    assert_eq!(checkpoint["step"], "complete");
    assert_eq!(checkpoint["correlation_id"], "corr-ckpt");
}
