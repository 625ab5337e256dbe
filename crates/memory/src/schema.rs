//! Domain memory schema: the Initializer→Worker task contract.
//!
//! An Initializer turns a free-form request into explicit goals,
//! requirements, and constraints; the Worker executes against the schema,
//! mutating only status, progress, decisions, and artifacts. Goals,
//! requirements, and constraints are never removed once added, and terminal
//! status transitions are monotone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Status of a goal, requirement, or the overall task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// An explicit goal the worker must drive to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGoal {
    pub id: String,
    pub description: String,
    /// 1 (critical) through 5 (deferred).
    pub priority: u8,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl AgentGoal {
    pub fn complete(&mut self) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, reason: Option<&str>) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Failed;
            self.completed_at = Some(Utc::now());
            self.failure_reason = reason.map(ToString::to_string);
        }
    }
}

/// A requirement the worker must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequirement {
    pub id: String,
    pub description: String,
    pub mandatory: bool,
    pub status: TaskStatus,
}

/// A constraint bounding the worker's behaviour. Hard constraints must
/// never be violated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConstraint {
    pub id: String,
    pub description: String,
    pub hard: bool,
    pub category: String,
}

/// A decision the worker recorded, with its reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub decision: String,
    pub reasoning: String,
    pub decided_at: DateTime<Utc>,
}

/// A produced artifact (summary, failure record, report, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub artifact_type: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Progress through the planned steps. `steps_completed <= steps_total`
/// holds for every active schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    pub steps_total: usize,
    pub steps_completed: usize,
    #[serde(default)]
    pub planned_steps: Vec<String>,
}

/// Mutable execution state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TaskState {
    pub fn transition(&mut self, step: &str) {
        self.current_step = step.to_string();
    }
}

/// The full Initializer output / Worker input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMemorySchema {
    pub schema_id: String,
    pub agent_id: String,
    pub agent_type: String,
    pub domain: String,
    pub session_id: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub goals: Vec<AgentGoal>,
    #[serde(default)]
    pub requirements: Vec<AgentRequirement>,
    #[serde(default)]
    pub constraints: Vec<AgentConstraint>,
    #[serde(default)]
    pub progress: TaskProgress,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub decisions: Vec<AgentDecision>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainMemorySchema {
    #[must_use]
    pub fn new(
        agent_id: &str,
        agent_type: &str,
        domain: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            schema_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            agent_type: agent_type.to_string(),
            domain: domain.to_string(),
            session_id: session_id.to_string(),
            task_id: Uuid::new_v4().to_string(),
            user_id: user_id.map(ToString::to_string),
            goals: Vec::new(),
            requirements: Vec::new(),
            constraints: Vec::new(),
            progress: TaskProgress::default(),
            state: TaskState::default(),
            decisions: Vec::new(),
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_goal(&mut self, description: &str, priority: u8) {
        self.goals.push(AgentGoal {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            priority: priority.clamp(1, 5),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            failure_reason: None,
        });
    }

    pub fn add_requirement(&mut self, description: &str, mandatory: bool) {
        self.requirements.push(AgentRequirement {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            mandatory,
            status: TaskStatus::Pending,
        });
    }

    pub fn add_constraint(&mut self, description: &str, hard: bool, category: &str) {
        self.constraints.push(AgentConstraint {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            hard,
            category: category.to_string(),
        });
    }

    pub fn record_decision(&mut self, decision: &str, reasoning: &str) {
        self.decisions.push(AgentDecision {
            decision: decision.to_string(),
            reasoning: reasoning.to_string(),
            decided_at: Utc::now(),
        });
    }

    pub fn add_artifact(&mut self, name: &str, artifact_type: &str, content: &str, metadata: Value) {
        self.artifacts.push(Artifact {
            name: name.to_string(),
            artifact_type: artifact_type.to_string(),
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        });
    }

    pub fn complete_step(&mut self) {
        if self.progress.steps_completed < self.progress.steps_total {
            self.progress.steps_completed += 1;
        }
    }

    /// True when every goal has reached a terminal status.
    #[must_use]
    pub fn all_goals_terminal(&self) -> bool {
        self.goals.iter().all(|g| g.status.is_terminal())
    }

    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Render the schema as a prompt-ready excerpt for context building.
    #[must_use]
    pub fn to_context_prompt(&self) -> String {
        let mut out = String::new();
        out.push_str("### Current Task\n");
        out.push_str(&format!(
            "Step: {} ({}/{} steps)\n",
            self.state.current_step, self.progress.steps_completed, self.progress.steps_total
        ));

        if !self.goals.is_empty() {
            out.push_str("Goals:\n");
            for goal in &self.goals {
                out.push_str(&format!(
                    "- [{:?}] (p{}) {}\n",
                    goal.status, goal.priority, goal.description
                ));
            }
        }

        if !self.constraints.is_empty() {
            out.push_str("Constraints:\n");
            for constraint in &self.constraints {
                let kind = if constraint.hard { "hard" } else { "soft" };
                out.push_str(&format!(
                    "- ({kind}/{}) {}\n",
                    constraint.category, constraint.description
                ));
            }
        }

        if let Some(error) = &self.state.last_error {
            out.push_str(&format!("Last error: {error}\n"));
        }

        out
    }
}
