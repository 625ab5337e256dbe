//! Memory tiers and the entries stored in them.
//!
//! Every persisted record is a [`MemoryEntry`]: a common envelope (id, agent,
//! timestamps) around a tier-specific payload. The payload is a tagged union
//! dispatched on `memory_type`, so a store can round-trip entries without
//! knowing which tier it is handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Memory tier. Determines TTL in the fast store and routing in the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Conversation context. Fast store, short TTL.
    ShortTerm,
    /// Task scratchpad bound to a session. Fast store, 24h TTL.
    Working,
    /// Episodic records. Fast store, 7d TTL.
    Episodic,
    /// Typed domain objects. Durable.
    Entity,
    /// Per-user preferences and facts. Durable.
    User,
    /// Accumulated domain knowledge. Durable.
    LongTerm,
}

impl MemoryType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Entity => "entity",
            Self::User => "user",
            Self::LongTerm => "long_term",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Short-term conversation memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMemory {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl ConversationMemory {
    pub fn add_message(&mut self, role: &str, content: &str, metadata: Option<Value>) {
        self.messages.push(Message {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            metadata,
        });
        self.message_count = self.messages.len();
    }

    /// Most recent `limit` messages, oldest first.
    #[must_use]
    pub fn recent_messages(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

/// Working memory: per-task scratchpad bound to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub scratchpad: HashMap<String, Value>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Attribute value with confidence, as stored on an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: Value,
    pub confidence: f64,
}

/// Relationship tuple stored on the source entity. No pointer cycles:
/// targets are referenced by stable ID only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub relation_type: String,
    pub target_entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Durable memory for a typed domain object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMemory {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<EntityRelationship>,
}

impl EntityMemory {
    pub fn update_attribute(&mut self, key: &str, value: Value) {
        self.attributes.insert(
            key.to_string(),
            AttributeValue {
                value,
                confidence: 1.0,
            },
        );
    }

    pub fn add_relationship(
        &mut self,
        relation_type: &str,
        target_entity_id: &str,
        metadata: Option<Value>,
    ) {
        self.relationships.push(EntityRelationship {
            relation_type: relation_type.to_string(),
            target_entity_id: target_entity_id.to_string(),
            metadata,
        });
    }
}

/// A stored user preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub value: Value,
    /// Whether the user stated this preference explicitly.
    pub explicit: bool,
    pub updated_at: DateTime<Utc>,
}

/// A recorded fact about a user. Facts are append-only and never
/// deduplicated automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFact {
    pub fact: String,
    pub source: String,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Durable per-user memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMemory {
    pub user_id: String,
    #[serde(default)]
    pub preferences: HashMap<String, Preference>,
    #[serde(default)]
    pub facts: Vec<UserFact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    #[serde(default)]
    pub interaction_counts: HashMap<String, u64>,
}

impl UserMemory {
    pub fn set_preference(&mut self, key: &str, value: Value, explicit: bool) {
        self.preferences.insert(
            key.to_string(),
            Preference {
                value,
                explicit,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn add_fact(&mut self, fact: &str, source: &str, confidence: f64) {
        self.facts.push(UserFact {
            fact: fact.to_string(),
            source: source.to_string(),
            confidence,
            recorded_at: Utc::now(),
        });
    }

    pub fn record_interaction(&mut self, interaction_type: &str) {
        *self
            .interaction_counts
            .entry(interaction_type.to_string())
            .or_insert(0) += 1;
    }
}

/// A piece of accumulated knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub content: String,
    pub category: String,
    pub source: String,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

/// A discovered pattern or best practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub name: String,
    pub description: String,
    pub when_to_use: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A recorded error pattern, kept so future tasks can avoid it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub error_type: String,
    pub description: String,
    pub prevention: String,
    pub severity: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of a completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub summary: String,
    pub success: bool,
    pub duration_ms: f64,
    #[serde(default)]
    pub learnings: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Aggregate performance counters for the domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub avg_duration_ms: f64,
}

/// Durable long-term memory for an agent's domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMemory {
    pub domain: String,
    #[serde(default)]
    pub knowledge: Vec<KnowledgeItem>,
    #[serde(default)]
    pub patterns: Vec<PatternRecord>,
    #[serde(default)]
    pub error_patterns: Vec<ErrorPattern>,
    #[serde(default)]
    pub task_history: Vec<TaskRecord>,
    #[serde(default)]
    pub performance: PerformanceStats,
}

impl DomainMemory {
    pub fn add_knowledge(&mut self, content: &str, category: &str, source: &str, confidence: f64) {
        self.knowledge.push(KnowledgeItem {
            content: content.to_string(),
            category: category.to_string(),
            source: source.to_string(),
            confidence,
            recorded_at: Utc::now(),
        });
    }

    pub fn add_pattern(
        &mut self,
        name: &str,
        description: &str,
        when_to_use: &str,
        example: Option<&str>,
    ) {
        self.patterns.push(PatternRecord {
            name: name.to_string(),
            description: description.to_string(),
            when_to_use: when_to_use.to_string(),
            example: example.map(ToString::to_string),
            recorded_at: Utc::now(),
        });
    }

    pub fn record_error(
        &mut self,
        error_type: &str,
        description: &str,
        prevention: &str,
        severity: &str,
    ) {
        self.error_patterns.push(ErrorPattern {
            error_type: error_type.to_string(),
            description: description.to_string(),
            prevention: prevention.to_string(),
            severity: severity.to_string(),
            recorded_at: Utc::now(),
        });
    }

    pub fn record_task_completion(
        &mut self,
        task_id: &str,
        summary: &str,
        success: bool,
        duration_ms: f64,
        learnings: &[String],
    ) {
        self.task_history.push(TaskRecord {
            task_id: task_id.to_string(),
            summary: summary.to_string(),
            success,
            duration_ms,
            learnings: learnings.to_vec(),
            completed_at: Utc::now(),
        });

        if success {
            self.performance.tasks_completed += 1;
        } else {
            self.performance.tasks_failed += 1;
        }
        let total = self.performance.tasks_completed + self.performance.tasks_failed;
        if total > 0 {
            // Running average over all recorded tasks.
            let prev = self.performance.avg_duration_ms;
            self.performance.avg_duration_ms = prev + (duration_ms - prev) / total as f64;
        }
    }
}

/// Tier-specific payload, tagged on `memory_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "memory_type", rename_all = "snake_case")]
pub enum MemoryPayload {
    ShortTerm(ConversationMemory),
    Working(WorkingMemory),
    Episodic(WorkingMemory),
    Entity(EntityMemory),
    User(UserMemory),
    LongTerm(DomainMemory),
}

impl MemoryPayload {
    #[must_use]
    pub fn memory_type(&self) -> MemoryType {
        match self {
            Self::ShortTerm(_) => MemoryType::ShortTerm,
            Self::Working(_) => MemoryType::Working,
            Self::Episodic(_) => MemoryType::Episodic,
            Self::Entity(_) => MemoryType::Entity,
            Self::User(_) => MemoryType::User,
            Self::LongTerm(_) => MemoryType::LongTerm,
        }
    }
}

/// Envelope around a tier payload. `updated_at` is refreshed on every save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: MemoryPayload,
}

impl MemoryEntry {
    #[must_use]
    pub fn new(agent_id: &str, payload: MemoryPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            created_at: now,
            updated_at: now,
            expires_at: None,
            payload,
        }
    }

    /// Construct an entry with a caller-chosen stable ID. Used for records
    /// that must be addressable across retransmissions, like workflow
    /// checkpoints keyed by correlation ID.
    #[must_use]
    pub fn with_id(id: &str, agent_id: &str, payload: MemoryPayload) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            agent_id: agent_id.to_string(),
            created_at: now,
            updated_at: now,
            expires_at: None,
            payload,
        }
    }

    #[must_use]
    pub fn memory_type(&self) -> MemoryType {
        self.payload.memory_type()
    }

    /// The conversation payload, if this entry is short-term memory.
    #[must_use]
    pub fn as_conversation(&self) -> Option<&ConversationMemory> {
        match &self.payload {
            MemoryPayload::ShortTerm(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_user(&self) -> Option<&UserMemory> {
        match &self.payload {
            MemoryPayload::User(u) => Some(u),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_entity(&self) -> Option<&EntityMemory> {
        match &self.payload {
            MemoryPayload::Entity(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_domain(&self) -> Option<&DomainMemory> {
        match &self.payload {
            MemoryPayload::LongTerm(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_round_trip() {
        let mut conv = ConversationMemory {
            conversation_id: "conv-1".to_string(),
            user_id: Some("user-1".to_string()),
            messages: vec![],
            summary: None,
            message_count: 0,
            context: HashMap::new(),
        };
        conv.add_message("user", "hello", None);

        let entry = MemoryEntry::new("agent-sre", MemoryPayload::ShortTerm(conv));
        let encoded = serde_json::to_string(&entry).unwrap();
        let decoded: MemoryEntry = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.memory_type(), MemoryType::ShortTerm);
        assert_eq!(decoded.as_conversation().unwrap().message_count, 1);
        assert_eq!(decoded.id, entry.id);
    }

    #[test]
    fn test_memory_type_tag() {
        let entry = MemoryEntry::new(
            "agent-sre",
            MemoryPayload::User(UserMemory {
                user_id: "u1".to_string(),
                preferences: HashMap::new(),
                facts: vec![],
                custom_instructions: None,
                interaction_counts: HashMap::new(),
            }),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["memory_type"], "user");
    }

    #[test]
    fn test_user_facts_never_deduplicated() {
        let mut user = UserMemory {
            user_id: "u1".to_string(),
            preferences: HashMap::new(),
            facts: vec![],
            custom_instructions: None,
            interaction_counts: HashMap::new(),
        };
        user.add_fact("prefers terse output", "conversation", 0.8);
        user.add_fact("prefers terse output", "conversation", 0.8);
        assert_eq!(user.facts.len(), 2);
    }

    #[test]
    fn test_entity_attribute_merge() {
        let mut entity = EntityMemory {
            entity_type: "alert".to_string(),
            entity_id: "fp-1".to_string(),
            entity_name: None,
            attributes: HashMap::new(),
            tags: vec![],
            relationships: vec![],
        };
        entity.update_attribute("namespace", json!("flux-system"));
        entity.update_attribute("namespace", json!("production"));
        assert_eq!(entity.attributes["namespace"].value, json!("production"));

        entity.add_relationship("triggered_by", "rule-7", None);
        assert_eq!(entity.relationships.len(), 1);
    }

    #[test]
    fn test_task_completion_updates_performance() {
        let mut domain = DomainMemory {
            domain: "sre".to_string(),
            knowledge: vec![],
            patterns: vec![],
            error_patterns: vec![],
            task_history: vec![],
            performance: PerformanceStats::default(),
        };
        domain.record_task_completion("t1", "ok", true, 100.0, &[]);
        domain.record_task_completion("t2", "failed", false, 300.0, &[]);

        assert_eq!(domain.performance.tasks_completed, 1);
        assert_eq!(domain.performance.tasks_failed, 1);
        assert!((domain.performance.avg_duration_ms - 200.0).abs() < f64::EPSILON);
    }
}
