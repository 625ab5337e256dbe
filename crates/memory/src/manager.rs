//! Unified facade over the memory tiers.
//!
//! The manager owns the store handles (a fast store for short-term and
//! working tiers, a durable store for entity/user/long-term tiers) and
//! routes every operation to the right one. Components receive a shared
//! reference; nothing else instantiates stores.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::factory::{ConstraintSpec, DomainMemoryFactory, GoalSpec, RequirementSpec};
use crate::schema::DomainMemorySchema;
use crate::store::postgres::PostgresMemoryStore;
use crate::store::redis::RedisMemoryStore;
use crate::store::{InMemoryStore, MemoryError, MemoryStore, QueryFilters};
use crate::telemetry;
use crate::types::{
    ConversationMemory, DomainMemory, EntityMemory, MemoryEntry, MemoryPayload, MemoryType,
    Message, UserMemory,
};

/// Environment-driven manager configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub agent_id: String,
    pub agent_type: String,
    pub domain: String,
    /// Enables the redis-backed fast store when set.
    pub fast_url: Option<String>,
    /// Enables the SQL-backed durable store when set.
    pub durable_url: Option<String>,
}

impl MemoryConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let agent_id =
            std::env::var("AGENT_ID").unwrap_or_else(|_| "agent-sre".to_string());
        Self {
            agent_id,
            agent_type: "sre".to_string(),
            domain: "sre".to_string(),
            fast_url: std::env::var("MEMORY_FAST_URL").ok(),
            durable_url: std::env::var("MEMORY_DURABLE_URL").ok(),
        }
    }
}

/// Optional summarizer for [`DomainMemoryManager::summarize_conversation`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, MemoryError>;
}

/// Options for [`DomainMemoryManager::build_context`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub session_id: Option<String>,
    pub include_user_memory: bool,
    pub include_domain_knowledge: bool,
    pub conversation_limit: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            user_id: None,
            conversation_id: None,
            session_id: None,
            include_user_memory: true,
            include_domain_knowledge: true,
            conversation_limit: 10,
        }
    }
}

/// Conversation excerpt inside a built context.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub summary: Option<String>,
    pub message_count: usize,
}

/// User excerpt inside a built context.
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub user_id: String,
    pub preferences: HashMap<String, Value>,
    pub facts: Vec<String>,
    pub custom_instructions: Option<String>,
}

/// Domain-knowledge excerpt inside a built context.
#[derive(Debug, Clone, Serialize)]
pub struct DomainKnowledge {
    pub patterns: Vec<String>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

/// Prompt-ready aggregate of the relevant memory tiers.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryContext {
    pub agent_id: String,
    pub agent_type: String,
    pub domain: String,
    pub conversation: Option<ConversationContext>,
    pub task: Option<String>,
    pub user: Option<UserContext>,
    pub domain_knowledge: Option<DomainKnowledge>,
}

impl MemoryContext {
    /// Flatten the context into a prompt section.
    #[must_use]
    pub fn format_for_prompt(&self) -> String {
        let mut lines = vec!["## Context".to_string()];

        if let Some(user) = &self.user {
            lines.push(format!("\n### User: {}", user.user_id));
            if !user.preferences.is_empty() {
                let prefs: Vec<String> = user
                    .preferences
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                lines.push(format!("Preferences: {}", prefs.join(", ")));
            }
            if !user.facts.is_empty() {
                lines.push(format!("Known facts: {}", user.facts.join(", ")));
            }
            if let Some(instructions) = &user.custom_instructions {
                lines.push(format!("Instructions: {instructions}"));
            }
        }

        if let Some(task) = &self.task {
            lines.push(format!("\n{task}"));
        }

        if let Some(conversation) = &self.conversation {
            if let Some(summary) = &conversation.summary {
                lines.push(format!("\n### Conversation Summary\n{summary}"));
            }
        }

        if let Some(knowledge) = &self.domain_knowledge {
            if !knowledge.patterns.is_empty() {
                lines.push(format!(
                    "\n### Available Patterns: {}",
                    knowledge.patterns.join(", ")
                ));
            }
        }

        lines.join("\n")
    }
}

/// Long-lived singleton wired into every handler at startup.
pub struct DomainMemoryManager {
    agent_id: String,
    agent_type: String,
    domain: String,
    fast: Arc<dyn MemoryStore>,
    durable: Arc<dyn MemoryStore>,
    fast_label: &'static str,
    durable_label: &'static str,
    factory: DomainMemoryFactory,
}

impl DomainMemoryManager {
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        let (fast, fast_label): (Arc<dyn MemoryStore>, _) = match &config.fast_url {
            Some(url) => (Arc::new(RedisMemoryStore::new(url)), "redis"),
            None => (Arc::new(InMemoryStore::new()), "in_memory"),
        };
        let (durable, durable_label): (Arc<dyn MemoryStore>, _) = match &config.durable_url {
            Some(url) => (Arc::new(PostgresMemoryStore::new(url)), "postgres"),
            None => (Arc::new(InMemoryStore::new()), "in_memory"),
        };
        Self::with_stores(config, fast, fast_label, durable, durable_label)
    }

    /// Construct with explicit stores. Used by tests and embedded setups.
    #[must_use]
    pub fn with_stores(
        config: &MemoryConfig,
        fast: Arc<dyn MemoryStore>,
        fast_label: &'static str,
        durable: Arc<dyn MemoryStore>,
        durable_label: &'static str,
    ) -> Self {
        let factory = DomainMemoryFactory::new(
            &config.agent_id,
            &config.agent_type,
            &config.domain,
            Arc::clone(&fast),
        )
        .with_default_constraints(vec![ConstraintSpec {
            description: "Stay within authorized scope".to_string(),
            hard: true,
            category: "authorization".to_string(),
        }]);

        Self {
            agent_id: config.agent_id.clone(),
            agent_type: config.agent_type.clone(),
            domain: config.domain.clone(),
            fast,
            durable,
            fast_label,
            durable_label,
            factory,
        }
    }

    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn connect(&self) -> Result<(), MemoryError> {
        self.fast.connect().await?;
        self.durable.connect().await?;
        tracing::info!(
            fast = self.fast_label,
            durable = self.durable_label,
            "memory manager connected"
        );
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), MemoryError> {
        self.fast.disconnect().await?;
        self.durable.disconnect().await?;
        tracing::info!("memory manager disconnected");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conversation memory (short-term)
    // ------------------------------------------------------------------

    /// Start a new conversation, or resume an existing one by ID.
    pub async fn start_conversation(
        &self,
        user_id: Option<&str>,
        conversation_id: Option<&str>,
        initial_message: Option<&str>,
    ) -> Result<MemoryEntry, MemoryError> {
        if let Some(conversation_id) = conversation_id {
            if let Some(existing) = self.get_conversation(conversation_id).await? {
                telemetry::record_cache_event("conversation", true);
                tracing::info!(conversation_id, "conversation.resumed");
                return Ok(existing);
            }
            telemetry::record_cache_event("conversation", false);
        }

        let mut conversation = ConversationMemory {
            conversation_id: conversation_id
                .map(ToString::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: user_id.map(ToString::to_string),
            messages: Vec::new(),
            summary: None,
            message_count: 0,
            context: HashMap::new(),
        };
        if let Some(message) = initial_message {
            conversation.add_message("user", message, None);
            telemetry::record_conversation_message("user", conversation.message_count);
        }

        let mut entry = MemoryEntry::new(&self.agent_id, MemoryPayload::ShortTerm(conversation));
        self.fast.save(&mut entry).await?;
        telemetry::record_store_op(self.fast_label, "save");

        tracing::info!(
            conversation_id = entry.as_conversation().map(|c| c.conversation_id.as_str()),
            user_id,
            "conversation.started"
        );
        Ok(entry)
    }

    pub async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        telemetry::record_store_op(self.fast_label, "query");
        let entries = self
            .fast
            .query(
                MemoryType::ShortTerm,
                &self.agent_id,
                &QueryFilters::conversation(conversation_id),
                1,
            )
            .await?;
        Ok(entries.into_iter().next())
    }

    /// Append a message in arrival order and persist the conversation.
    pub async fn add_message(
        &self,
        conversation: &mut MemoryEntry,
        role: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<(), MemoryError> {
        let MemoryPayload::ShortTerm(memory) = &mut conversation.payload else {
            return Ok(());
        };
        memory.add_message(role, content, metadata);
        telemetry::record_conversation_message(role, memory.message_count);

        self.fast.save(conversation).await?;
        telemetry::record_store_op(self.fast_label, "save");
        Ok(())
    }

    /// Reduce the message list to a bounded summary string. Without a
    /// summarizer, uses a deterministic extractive rule: first two, middle,
    /// and last two messages at 50-char prefixes (all messages at 100 chars
    /// when the conversation has five or fewer).
    pub async fn summarize_conversation(
        &self,
        conversation: &mut MemoryEntry,
        summarizer: Option<&dyn Summarizer>,
    ) -> Result<String, MemoryError> {
        let MemoryPayload::ShortTerm(memory) = &mut conversation.payload else {
            return Ok(String::new());
        };

        let summary = match summarizer {
            Some(summarizer) => summarizer.summarize(&memory.messages).await?,
            None => extractive_summary(&memory.messages),
        };

        memory.summary = Some(summary.clone());
        self.fast.save(conversation).await?;
        telemetry::record_store_op(self.fast_label, "save");
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // User memory (personalization)
    // ------------------------------------------------------------------

    pub async fn get_user_memory(
        &self,
        user_id: &str,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        telemetry::record_store_op(self.durable_label, "query");
        let entries = self
            .durable
            .query(
                MemoryType::User,
                &self.agent_id,
                &QueryFilters::user(user_id),
                1,
            )
            .await?;
        let found = entries.into_iter().next();
        telemetry::record_cache_event("user", found.is_some());
        Ok(found)
    }

    /// Read-through: creates an empty user memory on miss.
    pub async fn get_or_create_user_memory(
        &self,
        user_id: &str,
    ) -> Result<MemoryEntry, MemoryError> {
        if let Some(existing) = self.get_user_memory(user_id).await? {
            return Ok(existing);
        }

        let mut entry = MemoryEntry::new(
            &self.agent_id,
            MemoryPayload::User(UserMemory {
                user_id: user_id.to_string(),
                preferences: HashMap::new(),
                facts: Vec::new(),
                custom_instructions: None,
                interaction_counts: HashMap::new(),
            }),
        );
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        tracing::info!(user_id, "user memory created");
        Ok(entry)
    }

    pub async fn update_user_preference(
        &self,
        user_id: &str,
        key: &str,
        value: Value,
        explicit: bool,
    ) -> Result<(), MemoryError> {
        let mut entry = self.get_or_create_user_memory(user_id).await?;
        if let MemoryPayload::User(user) = &mut entry.payload {
            user.set_preference(key, value, explicit);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        telemetry::record_preference_update(explicit);
        Ok(())
    }

    pub async fn add_user_fact(
        &self,
        user_id: &str,
        fact: &str,
        source: &str,
        confidence: f64,
    ) -> Result<(), MemoryError> {
        let mut entry = self.get_or_create_user_memory(user_id).await?;
        if let MemoryPayload::User(user) = &mut entry.payload {
            user.add_fact(fact, source, confidence);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        Ok(())
    }

    pub async fn record_user_interaction(
        &self,
        user_id: &str,
        interaction_type: &str,
    ) -> Result<(), MemoryError> {
        let mut entry = self.get_or_create_user_memory(user_id).await?;
        if let MemoryPayload::User(user) = &mut entry.payload {
            user.record_interaction(interaction_type);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entity memory (domain objects)
    // ------------------------------------------------------------------

    pub async fn get_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        telemetry::record_store_op(self.durable_label, "query");
        let entries = self
            .durable
            .query(
                MemoryType::Entity,
                &self.agent_id,
                &QueryFilters::entity(entity_type, entity_id),
                1,
            )
            .await?;
        let found = entries.into_iter().next();
        telemetry::record_cache_event("entity", found.is_some());
        Ok(found)
    }

    /// Read-modify-write: merges the attribute map and unions tags.
    pub async fn create_or_update_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        entity_name: Option<&str>,
        attributes: HashMap<String, Value>,
        tags: Vec<String>,
    ) -> Result<MemoryEntry, MemoryError> {
        if let Some(mut existing) = self.get_entity(entity_type, entity_id).await? {
            if let MemoryPayload::Entity(entity) = &mut existing.payload {
                for (key, value) in attributes {
                    entity.update_attribute(&key, value);
                }
                for tag in tags {
                    if !entity.tags.contains(&tag) {
                        entity.tags.push(tag);
                    }
                }
                if let Some(name) = entity_name {
                    entity.entity_name = Some(name.to_string());
                }
            }
            self.durable.save(&mut existing).await?;
            telemetry::record_store_op(self.durable_label, "save");
            return Ok(existing);
        }

        let mut entity = EntityMemory {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            entity_name: entity_name.map(ToString::to_string),
            attributes: HashMap::new(),
            tags,
            relationships: Vec::new(),
        };
        for (key, value) in attributes {
            entity.update_attribute(&key, value);
        }

        let mut entry = MemoryEntry::new(&self.agent_id, MemoryPayload::Entity(entity));
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        Ok(entry)
    }

    pub async fn add_entity_relationship(
        &self,
        entity_type: &str,
        entity_id: &str,
        relation_type: &str,
        target_entity_id: &str,
        metadata: Option<Value>,
    ) -> Result<(), MemoryError> {
        let Some(mut entry) = self.get_entity(entity_type, entity_id).await? else {
            return Ok(());
        };
        if let MemoryPayload::Entity(entity) = &mut entry.payload {
            entity.add_relationship(relation_type, target_entity_id, metadata);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Long-term memory (knowledge)
    // ------------------------------------------------------------------

    pub async fn get_domain_memory(&self) -> Result<Option<MemoryEntry>, MemoryError> {
        telemetry::record_store_op(self.durable_label, "query");
        let entries = self
            .durable
            .query(
                MemoryType::LongTerm,
                &self.agent_id,
                &QueryFilters::domain(&self.domain),
                1,
            )
            .await?;
        Ok(entries.into_iter().next())
    }

    pub async fn get_or_create_domain_memory(&self) -> Result<MemoryEntry, MemoryError> {
        if let Some(existing) = self.get_domain_memory().await? {
            return Ok(existing);
        }

        let mut entry = MemoryEntry::new(
            &self.agent_id,
            MemoryPayload::LongTerm(DomainMemory {
                domain: self.domain.clone(),
                knowledge: Vec::new(),
                patterns: Vec::new(),
                error_patterns: Vec::new(),
                task_history: Vec::new(),
                performance: crate::types::PerformanceStats::default(),
            }),
        );
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        tracing::info!(domain = %self.domain, "domain memory created");
        Ok(entry)
    }

    pub async fn record_learning(
        &self,
        content: &str,
        source: &str,
        category: &str,
        confidence: f64,
    ) -> Result<(), MemoryError> {
        let mut entry = self.get_or_create_domain_memory().await?;
        if let MemoryPayload::LongTerm(domain) = &mut entry.payload {
            domain.add_knowledge(content, category, source, confidence);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        telemetry::record_domain_record("learning");
        Ok(())
    }

    pub async fn record_pattern(
        &self,
        name: &str,
        description: &str,
        when_to_use: &str,
        example: Option<&str>,
    ) -> Result<(), MemoryError> {
        let mut entry = self.get_or_create_domain_memory().await?;
        if let MemoryPayload::LongTerm(domain) = &mut entry.payload {
            domain.add_pattern(name, description, when_to_use, example);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        telemetry::record_domain_record("pattern");
        Ok(())
    }

    pub async fn record_error_pattern(
        &self,
        error_type: &str,
        description: &str,
        prevention: &str,
        severity: &str,
    ) -> Result<(), MemoryError> {
        let mut entry = self.get_or_create_domain_memory().await?;
        if let MemoryPayload::LongTerm(domain) = &mut entry.payload {
            domain.record_error(error_type, description, prevention, severity);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        telemetry::record_domain_record("error_pattern");
        Ok(())
    }

    pub async fn record_task_completion(
        &self,
        task_id: &str,
        summary: &str,
        success: bool,
        duration_ms: f64,
        learnings: &[String],
    ) -> Result<(), MemoryError> {
        let mut entry = self.get_or_create_domain_memory().await?;
        if let MemoryPayload::LongTerm(domain) = &mut entry.payload {
            domain.record_task_completion(task_id, summary, success, duration_ms, learnings);
        }
        self.durable.save(&mut entry).await?;
        telemetry::record_store_op(self.durable_label, "save");
        telemetry::record_domain_record("task_completion");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Workflow checkpoints (working memory)
    // ------------------------------------------------------------------

    /// Persist a workflow state record keyed by correlation ID. The
    /// correlation ID owns the record: repeated saves overwrite in place.
    pub async fn save_workflow_state(
        &self,
        correlation_id: &str,
        state: Value,
    ) -> Result<(), MemoryError> {
        let mut scratchpad = HashMap::new();
        scratchpad.insert("workflow_state".to_string(), state);

        let mut entry = MemoryEntry::with_id(
            &format!("workflow:{correlation_id}"),
            &self.agent_id,
            MemoryPayload::Working(crate::types::WorkingMemory {
                session_id: correlation_id.to_string(),
                task_id: None,
                scratchpad,
                notes: Vec::new(),
            }),
        );
        self.fast.save(&mut entry).await?;
        telemetry::record_store_op(self.fast_label, "save");
        Ok(())
    }

    /// Load a previously checkpointed workflow state, if any.
    pub async fn get_workflow_state(
        &self,
        correlation_id: &str,
    ) -> Result<Option<Value>, MemoryError> {
        telemetry::record_store_op(self.fast_label, "get");
        let entry = self
            .fast
            .get(&format!("workflow:{correlation_id}"), MemoryType::Working)
            .await?;
        Ok(entry.and_then(|entry| match entry.payload {
            MemoryPayload::Working(mut working) => working.scratchpad.remove("workflow_state"),
            _ => None,
        }))
    }

    // ------------------------------------------------------------------
    // Domain memory factory (task execution)
    // ------------------------------------------------------------------

    #[must_use]
    pub fn factory(&self) -> &DomainMemoryFactory {
        &self.factory
    }

    pub async fn create_task(
        &self,
        request: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        goals: Option<Vec<GoalSpec>>,
        requirements: Option<Vec<RequirementSpec>>,
        constraints: Option<Vec<ConstraintSpec>>,
    ) -> Result<DomainMemorySchema, MemoryError> {
        self.factory
            .initialize(request, user_id, session_id, None, goals, requirements, constraints)
            .await
    }

    pub async fn get_task(
        &self,
        session_id: Option<&str>,
        schema_id: Option<&str>,
    ) -> Result<Option<DomainMemorySchema>, MemoryError> {
        if let Some(schema_id) = schema_id {
            return self.fast.get_schema(schema_id).await;
        }
        if let Some(session_id) = session_id {
            return self
                .fast
                .get_schema_by_agent(&self.agent_id, Some(session_id))
                .await;
        }
        Ok(None)
    }

    pub async fn update_task(&self, schema: &mut DomainMemorySchema) -> Result<(), MemoryError> {
        self.factory.update(schema).await
    }

    pub async fn complete_task(
        &self,
        schema: &mut DomainMemorySchema,
        summary: &str,
        success: bool,
        learnings: &[String],
    ) -> Result<(), MemoryError> {
        self.factory
            .complete(schema, summary, success, learnings)
            .await?;

        for learning in learnings {
            self.record_learning(learning, &format!("task:{}", schema.task_id), "general", 1.0)
                .await?;
        }
        Ok(())
    }

    pub async fn fail_task(
        &self,
        schema: &mut DomainMemorySchema,
        error: &str,
        recoverable: bool,
    ) -> Result<(), MemoryError> {
        self.factory.fail(schema, error, recoverable).await
    }

    // ------------------------------------------------------------------
    // Context building
    // ------------------------------------------------------------------

    /// Aggregate user, task, conversation, and domain knowledge into a
    /// prompt-ready object.
    pub async fn build_context(
        &self,
        options: &ContextOptions,
    ) -> Result<MemoryContext, MemoryError> {
        let start = Instant::now();

        let mut context = MemoryContext {
            agent_id: self.agent_id.clone(),
            agent_type: self.agent_type.clone(),
            domain: self.domain.clone(),
            conversation: None,
            task: None,
            user: None,
            domain_knowledge: None,
        };

        if let Some(conversation_id) = &options.conversation_id {
            if let Some(entry) = self.get_conversation(conversation_id).await? {
                if let Some(memory) = entry.as_conversation() {
                    context.conversation = Some(ConversationContext {
                        conversation_id: memory.conversation_id.clone(),
                        messages: memory.recent_messages(options.conversation_limit).to_vec(),
                        summary: memory.summary.clone(),
                        message_count: memory.message_count,
                    });
                }
            }
        }

        if let Some(session_id) = &options.session_id {
            if let Some(schema) = self.get_task(Some(session_id), None).await? {
                context.task = Some(schema.to_context_prompt());
            }
        }

        if options.include_user_memory {
            if let Some(user_id) = &options.user_id {
                if let Some(entry) = self.get_user_memory(user_id).await? {
                    if let Some(user) = entry.as_user() {
                        context.user = Some(UserContext {
                            user_id: user.user_id.clone(),
                            preferences: user
                                .preferences
                                .iter()
                                .map(|(k, p)| (k.clone(), p.value.clone()))
                                .collect(),
                            facts: user
                                .facts
                                .iter()
                                .rev()
                                .take(5)
                                .rev()
                                .map(|f| f.fact.clone())
                                .collect(),
                            custom_instructions: user.custom_instructions.clone(),
                        });
                    }
                }
            }
        }

        if options.include_domain_knowledge {
            if let Some(entry) = self.get_domain_memory().await? {
                if let Some(domain) = entry.as_domain() {
                    context.domain_knowledge = Some(DomainKnowledge {
                        patterns: domain
                            .patterns
                            .iter()
                            .rev()
                            .take(5)
                            .rev()
                            .map(|p| p.name.clone())
                            .collect(),
                        tasks_completed: domain.performance.tasks_completed,
                        tasks_failed: domain.performance.tasks_failed,
                    });
                }
            }
        }

        let rendered = context.format_for_prompt();
        telemetry::record_context_build(
            &self.agent_type,
            start.elapsed().as_secs_f64(),
            rendered.len(),
        );

        Ok(context)
    }
}

/// Deterministic extractive summary used when no summarizer is supplied.
fn extractive_summary(messages: &[Message]) -> String {
    fn prefix(content: &str, len: usize) -> String {
        content.chars().take(len).collect()
    }

    if messages.is_empty() {
        return String::new();
    }

    if messages.len() <= 5 {
        return messages
            .iter()
            .map(|m| prefix(&m.content, 100))
            .collect::<Vec<_>>()
            .join(" | ");
    }

    let middle = messages.len() / 2;
    let picks = [
        &messages[0],
        &messages[1],
        &messages[middle],
        &messages[messages.len() - 2],
        &messages[messages.len() - 1],
    ];
    picks
        .iter()
        .map(|m| prefix(&m.content, 50))
        .collect::<Vec<_>>()
        .join(" | ")
}
