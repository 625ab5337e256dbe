//! HTTP ingress: CloudEvent sink, approval callbacks, health, and metrics.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use agent_memory::DomainMemoryManager;
use approvals::{ApprovalManager, ChatWebhookProvider};

use crate::alert::Alert;
use crate::cloudevent::{CloudEvent, ALERT_FIRED, ALERT_RESOLVED};
use crate::error::truncate_payload;
use crate::observability;
use crate::workflow::WorkflowEngine;

/// Correlation IDs with a workflow pass in flight. A concurrent arrival
/// for the same ID is rejected so state writes never interleave.
#[derive(Default)]
struct InFlightSet {
    inner: Mutex<HashSet<String>>,
}

impl InFlightSet {
    fn try_acquire(&self, correlation_id: &str) -> bool {
        self.inner
            .lock()
            .map(|mut set| set.insert(correlation_id.to_string()))
            .unwrap_or(false)
    }

    fn release(&self, correlation_id: &str) {
        if let Ok(mut set) = self.inner.lock() {
            set.remove(correlation_id);
        }
    }
}

/// Shared server state, wired once at startup.
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub approvals: Option<Arc<ApprovalManager>>,
    pub memory: Arc<DomainMemoryManager>,
    in_flight: InFlightSet,
    ready: AtomicBool,
}

impl AppState {
    #[must_use]
    pub fn new(
        engine: Arc<WorkflowEngine>,
        approvals: Option<Arc<ApprovalManager>>,
        memory: Arc<DomainMemoryManager>,
    ) -> Self {
        Self {
            engine,
            approvals,
            memory,
            in_flight: InFlightSet::default(),
            ready: AtomicBool::new(false),
        }
    }

    /// Flip the readiness gate once all components are initialized.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    fn try_acquire(&self, correlation_id: &str) -> bool {
        self.in_flight.try_acquire(correlation_id)
    }

    fn release(&self, correlation_id: &str) {
        self.in_flight.release(correlation_id);
    }
}

/// Build the agent router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(cloudevent_handler))
        .route("/approval/callback", post(approval_callback_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// CloudEvent sink. Terminal workflow failures are still HTTP 200: the
/// event was processed and its failure recorded, not retransmitted.
async fn cloudevent_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let event = match CloudEvent::parse(&headers, &body) {
        Ok(event) => event,
        Err(err) => {
            warn!(
                error = %err,
                body = %truncate_payload(&String::from_utf8_lossy(&body)),
                "cloudevent parse failed"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            );
        }
    };

    let correlation_id = observability::correlation_id_from(Some(&event.id), &headers);
    observability::record_cloudevent_received(&event.event_type, &event.source);

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        event_source = %event.source,
        correlation_id = %correlation_id,
        "cloudevent received"
    );

    match event.event_type.as_str() {
        ALERT_FIRED => {
            if !state.try_acquire(&correlation_id) {
                warn!(correlation_id = %correlation_id, "duplicate arrival while in flight");
                return (
                    StatusCode::OK,
                    Json(json!({
                        "status": "duplicate_in_flight",
                        "event_id": event.id,
                        "correlation_id": correlation_id,
                    })),
                );
            }

            let result = state.engine.run(&event, &correlation_id).await;
            state.release(&correlation_id);

            info!(
                correlation_id = %correlation_id,
                alertname = result.alertname.as_deref(),
                success = result.success,
                "remediation workflow completed"
            );
        }
        ALERT_RESOLVED => {
            record_resolved_alert(&state.memory, &event).await;
        }
        other => {
            // Peripheral event types pass through untouched.
            info!(event_type = other, "event type not handled by this agent");
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "processed",
            "event_id": event.id,
            "correlation_id": correlation_id,
        })),
    )
}

/// Resolved alerts are recorded to memory but never start a workflow.
async fn record_resolved_alert(memory: &DomainMemoryManager, event: &CloudEvent) {
    let alert = Alert::from_event_data(&event.data);
    let fingerprint = alert.stable_fingerprint();

    let attributes = std::collections::HashMap::from([
        ("status".to_string(), json!("resolved")),
        ("alertname".to_string(), json!(alert.name())),
        ("namespace".to_string(), json!(alert.resource_namespace())),
    ]);
    if let Err(error) = memory
        .create_or_update_entity("alert", &fingerprint, Some(alert.name()), attributes, vec![])
        .await
    {
        warn!(%error, "failed to record resolved alert entity");
    }

    if let Err(error) = memory
        .record_learning(
            &format!("Alert {} resolved", alert.name()),
            "alert.resolved",
            "observation",
            1.0,
        )
        .await
    {
        warn!(%error, "failed to record resolved alert learning");
    }

    info!(alertname = alert.name(), fingerprint = %fingerprint, "resolved alert recorded");
}

/// Approval callback endpoint. Accepts the normalized decision body, or a
/// chat interaction payload which is normalized first.
async fn approval_callback_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let Some(manager) = &state.approvals else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Approval manager not available" })),
        );
    };

    let decision = if payload.get("type").and_then(Value::as_str) == Some("block_actions") {
        match ChatWebhookProvider::parse_interaction(&payload) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    error = %err,
                    payload = %truncate_payload(&payload.to_string()),
                    "malformed chat interaction payload"
                );
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": err.to_string() })),
                );
            }
        }
    } else {
        match serde_json::from_value(payload.clone()) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    error = %err,
                    payload = %truncate_payload(&payload.to_string()),
                    "malformed approval callback"
                );
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("malformed approval callback: {err}") })),
                );
            }
        }
    };

    match manager.handle_response(&decision).await {
        Some(request) => {
            info!(
                request_id = %request.request_id,
                decision = %decision.decision,
                status = ?request.status,
                "approval callback processed"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "status": "processed",
                    "request_id": request.request_id,
                    "approval_status": request.status,
                })),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Approval request not found" })),
        ),
    }
}

/// Liveness probe: responds whenever the pod is active.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe: requires all components initialized.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready" })),
        )
    }
}

/// Prometheus scrape endpoint.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        observability::gather_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_dedup() {
        let set = InFlightSet::default();
        assert!(set.try_acquire("corr-1"));
        assert!(!set.try_acquire("corr-1"));
        set.release("corr-1");
        assert!(set.try_acquire("corr-1"));

        // Other correlation IDs are unaffected.
        assert!(set.try_acquire("corr-2"));
    }
}
