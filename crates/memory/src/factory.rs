//! Domain Memory Factory: the two-phase Initializer→Worker pattern.
//!
//! The Initializer analyzes an incoming request into explicit goals,
//! requirements, constraints, and planned steps; the Worker executes
//! against the resulting schema. Analysis is pluggable: an optional
//! LLM-backed [`TaskAnalyzer`] runs first, with a keyword rule table per
//! agent type as the fallback.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::schema::DomainMemorySchema;
use crate::store::{MemoryError, MemoryStore};

/// A goal produced by request analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSpec {
    pub description: String,
    pub priority: u8,
}

/// A requirement produced by request analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub description: String,
    pub mandatory: bool,
}

/// A constraint produced by request analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub description: String,
    pub hard: bool,
    pub category: String,
}

/// Structured output of request analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskAnalysis {
    #[serde(default)]
    pub goals: Vec<GoalSpec>,
    #[serde(default)]
    pub requirements: Vec<RequirementSpec>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Pluggable request analyzer (typically LLM-backed).
#[async_trait]
pub trait TaskAnalyzer: Send + Sync {
    async fn analyze(&self, request: &str) -> Result<TaskAnalysis, MemoryError>;
}

/// Rule-based analysis keyed on agent type. Fallback when no analyzer is
/// configured or the analyzer fails.
#[must_use]
pub fn rule_based_analyze(agent_type: &str, request: &str) -> TaskAnalysis {
    let request_lower = request.to_lowercase();
    let mut analysis = TaskAnalysis::default();

    match agent_type {
        "sre" | "security" => {
            if request_lower.contains("attack") || request_lower.contains("exploit") {
                analysis.goals.push(GoalSpec {
                    description: "Execute security test safely and document findings".to_string(),
                    priority: 1,
                });
            } else {
                analysis.goals.push(GoalSpec {
                    description: "Monitor and respond to operational events".to_string(),
                    priority: 1,
                });
            }
            analysis.constraints.push(ConstraintSpec {
                description: "Stay within authorized scope".to_string(),
                hard: true,
                category: "authorization".to_string(),
            });
            analysis.steps = vec![
                "extract_alert".to_string(),
                "select_remediation".to_string(),
                "execute".to_string(),
                "verify".to_string(),
            ];
        }
        "chat" => {
            analysis.goals.push(GoalSpec {
                description: "Provide helpful, accurate response to user query".to_string(),
                priority: 2,
            });
            analysis.constraints.push(ConstraintSpec {
                description: "Maintain conversation context and coherence".to_string(),
                hard: true,
                category: "quality".to_string(),
            });
        }
        _ => {}
    }

    if analysis.goals.is_empty() {
        let prefix: String = request.chars().take(100).collect();
        analysis.goals.push(GoalSpec {
            description: format!("Process request: {prefix}"),
            priority: 3,
        });
    }

    analysis
}

/// Orchestrates schema creation and lifecycle persistence.
pub struct DomainMemoryFactory {
    agent_id: String,
    agent_type: String,
    domain: String,
    store: Arc<dyn MemoryStore>,
    analyzer: Option<Arc<dyn TaskAnalyzer>>,
    default_constraints: Vec<ConstraintSpec>,
}

impl DomainMemoryFactory {
    #[must_use]
    pub fn new(
        agent_id: &str,
        agent_type: &str,
        domain: &str,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_type: agent_type.to_string(),
            domain: domain.to_string(),
            store,
            analyzer: None,
            default_constraints: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn TaskAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    #[must_use]
    pub fn with_default_constraints(mut self, constraints: Vec<ConstraintSpec>) -> Self {
        self.default_constraints = constraints;
        self
    }

    /// Initialize domain memory for a new task. Caller-supplied goals,
    /// requirements, and constraints are used verbatim; otherwise the
    /// analyzer (or the rule table) fills them in.
    #[allow(clippy::too_many_arguments)]
    pub async fn initialize(
        &self,
        request: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        context: Option<HashMap<String, Value>>,
        goals: Option<Vec<GoalSpec>>,
        requirements: Option<Vec<RequirementSpec>>,
        constraints: Option<Vec<ConstraintSpec>>,
    ) -> Result<DomainMemorySchema, MemoryError> {
        let session = session_id
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut schema = DomainMemorySchema::new(
            &self.agent_id,
            &self.agent_type,
            &self.domain,
            &session,
            user_id,
        );

        let predefined = goals.is_some();
        if let Some(goals) = goals {
            for goal in goals {
                schema.add_goal(&goal.description, goal.priority);
            }
        }
        if let Some(requirements) = requirements {
            for req in requirements {
                schema.add_requirement(&req.description, req.mandatory);
            }
        }
        if let Some(constraints) = constraints {
            for con in constraints {
                schema.add_constraint(&con.description, con.hard, &con.category);
            }
        }

        if !predefined {
            let analysis = match &self.analyzer {
                Some(analyzer) => match analyzer.analyze(request).await {
                    Ok(analysis) => analysis,
                    Err(error) => {
                        tracing::warn!(%error, "task analyzer failed, using rule-based analysis");
                        rule_based_analyze(&self.agent_type, request)
                    }
                },
                None => rule_based_analyze(&self.agent_type, request),
            };

            for goal in &analysis.goals {
                schema.add_goal(&goal.description, goal.priority);
            }
            for req in &analysis.requirements {
                schema.add_requirement(&req.description, req.mandatory);
            }
            for con in &analysis.constraints {
                schema.add_constraint(&con.description, con.hard, &con.category);
            }
            if !analysis.steps.is_empty() {
                schema.progress.steps_total = analysis.steps.len();
                schema.progress.planned_steps = analysis.steps.clone();
                schema
                    .state
                    .context
                    .insert("planned_steps".to_string(), json!(analysis.steps));
            }
        }

        for con in &self.default_constraints {
            schema.add_constraint(&con.description, con.hard, &con.category);
        }

        schema.state.transition("initialized");
        schema
            .state
            .context
            .insert("original_request".to_string(), json!(request));
        schema.state.context.insert(
            "initialized_at".to_string(),
            json!(Utc::now().to_rfc3339()),
        );
        if let Some(context) = context {
            schema.state.context.extend(context);
        }

        self.store.save_schema(&mut schema).await?;

        tracing::info!(
            schema_id = %schema.schema_id,
            goals = schema.goals.len(),
            requirements = schema.requirements.len(),
            constraints = schema.constraints.len(),
            "domain memory initialized"
        );

        Ok(schema)
    }

    /// Resume an existing session's schema, or initialize a new one.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        request: &str,
        user_id: Option<&str>,
    ) -> Result<DomainMemorySchema, MemoryError> {
        if let Some(existing) = self
            .store
            .get_schema_by_agent(&self.agent_id, Some(session_id))
            .await?
        {
            tracing::info!(
                schema_id = %existing.schema_id,
                session_id,
                "resuming domain memory"
            );
            return Ok(existing);
        }

        self.initialize(request, user_id, Some(session_id), None, None, None, None)
            .await
    }

    /// Persist schema mutations made by the worker.
    pub async fn update(&self, schema: &mut DomainMemorySchema) -> Result<(), MemoryError> {
        self.store.save_schema(schema).await?;
        Ok(())
    }

    /// Mark the task complete: transition all non-terminal goals, close out
    /// progress, and append a `completion_summary` artifact.
    pub async fn complete(
        &self,
        schema: &mut DomainMemorySchema,
        summary: &str,
        success: bool,
        learnings: &[String],
    ) -> Result<(), MemoryError> {
        for goal in &mut schema.goals {
            if !goal.status.is_terminal() {
                if success {
                    goal.complete();
                } else {
                    goal.fail(None);
                }
            }
        }

        schema
            .state
            .transition(if success { "completed" } else { "failed" });
        schema.progress.steps_completed = schema.progress.steps_total;

        schema.add_artifact(
            "completion_summary",
            "summary",
            summary,
            json!({
                "success": success,
                "learnings": learnings,
                "completed_at": Utc::now().to_rfc3339(),
            }),
        );

        self.update(schema).await?;

        tracing::info!(schema_id = %schema.schema_id, success, "task completed");
        Ok(())
    }

    /// Mark the task failed and record the error.
    pub async fn fail(
        &self,
        schema: &mut DomainMemorySchema,
        error: &str,
        recoverable: bool,
    ) -> Result<(), MemoryError> {
        schema.state.last_error = Some(error.to_string());
        schema.state.transition("failed");

        for goal in &mut schema.goals {
            if !goal.status.is_terminal() {
                goal.fail(Some(error));
            }
        }

        schema.add_artifact(
            "failure_record",
            "error",
            error,
            json!({
                "recoverable": recoverable,
                "failed_at": Utc::now().to_rfc3339(),
            }),
        );

        self.update(schema).await?;

        tracing::error!(schema_id = %schema.schema_id, error, recoverable, "task failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TaskStatus;
    use crate::store::InMemoryStore;

    fn factory() -> DomainMemoryFactory {
        let store = Arc::new(InMemoryStore::new());
        DomainMemoryFactory::new("agent-sre", "sre", "sre", store).with_default_constraints(vec![
            ConstraintSpec {
                description: "Never modify resources outside the cluster".to_string(),
                hard: true,
                category: "authorization".to_string(),
            },
        ])
    }

    #[tokio::test]
    async fn test_initialize_sre_rules() {
        let factory = factory();
        let schema = factory
            .initialize(
                "PodCrashLooping in production",
                None,
                Some("sess-1"),
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(schema.state.current_step, "initialized");
        assert_eq!(schema.goals.len(), 1);
        assert!(schema.goals[0].description.contains("Monitor and respond"));
        assert!(schema
            .constraints
            .iter()
            .any(|c| c.category == "authorization" && c.hard));
        assert_eq!(schema.progress.steps_total, 4);
        assert_eq!(
            schema.state.context["original_request"],
            json!("PodCrashLooping in production")
        );
    }

    #[tokio::test]
    async fn test_security_keywords_pick_safety_goal() {
        let analysis = rule_based_analyze("sre", "simulate attack on staging");
        assert!(analysis.goals[0].description.contains("security test"));
    }

    #[tokio::test]
    async fn test_default_goal_for_unknown_agent_type() {
        let analysis = rule_based_analyze("unknown", "do the thing");
        assert_eq!(analysis.goals.len(), 1);
        assert!(analysis.goals[0].description.starts_with("Process request:"));
        assert_eq!(analysis.goals[0].priority, 3);
    }

    #[tokio::test]
    async fn test_complete_transitions_goals_and_adds_artifact() {
        let factory = factory();
        let mut schema = factory
            .initialize("alert", None, Some("sess-1"), None, None, None, None)
            .await
            .unwrap();

        factory
            .complete(&mut schema, "remediation succeeded", true, &[])
            .await
            .unwrap();

        assert!(schema.all_goals_terminal());
        assert!(schema
            .goals
            .iter()
            .all(|g| g.status == TaskStatus::Completed));
        assert_eq!(schema.progress.steps_completed, schema.progress.steps_total);
        assert!(schema.artifact("completion_summary").is_some());
        assert_eq!(schema.state.current_step, "completed");
    }

    #[tokio::test]
    async fn test_fail_records_error() {
        let factory = factory();
        let mut schema = factory
            .initialize("alert", None, Some("sess-1"), None, None, None, None)
            .await
            .unwrap();

        factory
            .fail(&mut schema, "selection_failed", false)
            .await
            .unwrap();

        assert_eq!(schema.state.last_error.as_deref(), Some("selection_failed"));
        assert!(schema.artifact("failure_record").is_some());
        assert!(schema.goals.iter().all(|g| g.status == TaskStatus::Failed));
    }

    #[tokio::test]
    async fn test_get_or_create_resumes_session() {
        let factory = factory();
        let first = factory
            .get_or_create("sess-9", "first request", None)
            .await
            .unwrap();
        let second = factory
            .get_or_create("sess-9", "second request", None)
            .await
            .unwrap();
        assert_eq!(first.schema_id, second.schema_id);
    }
}
