//! Storage backends behind one polymorphic interface.
//!
//! Three backends: [`InMemoryStore`] for tests and development,
//! [`redis::RedisMemoryStore`] for short-term/working tiers with TTL, and
//! [`postgres::PostgresMemoryStore`] for durable tiers and task schemas.

pub mod postgres;
pub mod redis;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::schema::DomainMemorySchema;
use crate::types::{MemoryEntry, MemoryPayload, MemoryType};

/// Errors from store operations. Transport failures keep their source so
/// callers can decide whether a retry is worthwhile.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("store not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Field filters applied to [`MemoryStore::query`] results.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub domain: Option<String>,
}

impl QueryFilters {
    #[must_use]
    pub fn conversation(conversation_id: &str) -> Self {
        Self {
            conversation_id: Some(conversation_id.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn entity(entity_type: &str, entity_id: &str) -> Self {
        Self {
            entity_type: Some(entity_type.to_string()),
            entity_id: Some(entity_id.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn domain(domain: &str) -> Self {
        Self {
            domain: Some(domain.to_string()),
            ..Self::default()
        }
    }

    /// Whether an entry matches every set filter.
    #[must_use]
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(conversation_id) = &self.conversation_id {
            match &entry.payload {
                MemoryPayload::ShortTerm(c) if &c.conversation_id == conversation_id => {}
                _ => return false,
            }
        }
        if let Some(user_id) = &self.user_id {
            match &entry.payload {
                MemoryPayload::User(u) if &u.user_id == user_id => {}
                MemoryPayload::ShortTerm(c) if c.user_id.as_ref() == Some(user_id) => {}
                _ => return false,
            }
        }
        if let Some(entity_type) = &self.entity_type {
            match &entry.payload {
                MemoryPayload::Entity(e) if &e.entity_type == entity_type => {}
                _ => return false,
            }
        }
        if let Some(entity_id) = &self.entity_id {
            match &entry.payload {
                MemoryPayload::Entity(e) if &e.entity_id == entity_id => {}
                _ => return false,
            }
        }
        if let Some(domain) = &self.domain {
            match &entry.payload {
                MemoryPayload::LongTerm(d) if &d.domain == domain => {}
                _ => return false,
            }
        }
        true
    }
}

/// Polymorphic persistence interface shared by every backend.
///
/// `save` and `save_schema` refresh `updated_at` before writing. A schema
/// save also updates the "current schema for this agent/session" pointer so
/// resolution stays atomic per save.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn connect(&self) -> Result<(), MemoryError>;

    async fn disconnect(&self) -> Result<(), MemoryError>;

    async fn save(&self, entry: &mut MemoryEntry) -> Result<String, MemoryError>;

    async fn get(
        &self,
        entry_id: &str,
        memory_type: MemoryType,
    ) -> Result<Option<MemoryEntry>, MemoryError>;

    async fn delete(&self, entry_id: &str) -> Result<bool, MemoryError>;

    async fn query(
        &self,
        memory_type: MemoryType,
        agent_id: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;

    async fn save_schema(&self, schema: &mut DomainMemorySchema) -> Result<String, MemoryError>;

    async fn get_schema(&self, schema_id: &str)
        -> Result<Option<DomainMemorySchema>, MemoryError>;

    async fn get_schema_by_agent(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<DomainMemorySchema>, MemoryError>;
}

/// Process-local store. Data is lost at shutdown; for tests and development.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    schemas: RwLock<HashMap<String, DomainMemorySchema>>,
    connected: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn connect(&self) -> Result<(), MemoryError> {
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(store = "in_memory", "memory store connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MemoryError> {
        self.connected.store(false, Ordering::SeqCst);
        let cleared = {
            let mut entries = self.entries.write().await;
            let count = entries.len();
            entries.clear();
            count
        };
        self.schemas.write().await.clear();
        tracing::info!(store = "in_memory", cleared_entries = cleared, "memory store disconnected");
        Ok(())
    }

    async fn save(&self, entry: &mut MemoryEntry) -> Result<String, MemoryError> {
        entry.updated_at = Utc::now();
        self.entries
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());
        Ok(entry.id.clone())
    }

    async fn get(
        &self,
        entry_id: &str,
        memory_type: MemoryType,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(entry_id)
            .filter(|e| e.memory_type() == memory_type)
            .cloned())
    }

    async fn delete(&self, entry_id: &str) -> Result<bool, MemoryError> {
        Ok(self.entries.write().await.remove(entry_id).is_some())
    }

    async fn query(
        &self,
        memory_type: MemoryType,
        agent_id: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self.entries.read().await;
        let mut results: Vec<MemoryEntry> = entries
            .values()
            .filter(|e| e.memory_type() == memory_type && e.agent_id == agent_id)
            .filter(|e| filters.matches(e))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        results.truncate(limit);
        Ok(results)
    }

    async fn save_schema(&self, schema: &mut DomainMemorySchema) -> Result<String, MemoryError> {
        schema.updated_at = Utc::now();
        self.schemas
            .write()
            .await
            .insert(schema.schema_id.clone(), schema.clone());
        Ok(schema.schema_id.clone())
    }

    async fn get_schema(
        &self,
        schema_id: &str,
    ) -> Result<Option<DomainMemorySchema>, MemoryError> {
        Ok(self.schemas.read().await.get(schema_id).cloned())
    }

    async fn get_schema_by_agent(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<DomainMemorySchema>, MemoryError> {
        let schemas = self.schemas.read().await;
        let mut candidates: Vec<&DomainMemorySchema> = schemas
            .values()
            .filter(|s| s.agent_id == agent_id)
            .filter(|s| session_id.is_none_or(|sid| s.session_id == sid))
            .collect();
        candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(candidates.first().map(|s| (*s).clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationMemory, MemoryPayload};

    fn conversation_entry(conversation_id: &str) -> MemoryEntry {
        MemoryEntry::new(
            "agent-sre",
            MemoryPayload::ShortTerm(ConversationMemory {
                conversation_id: conversation_id.to_string(),
                user_id: None,
                messages: vec![],
                summary: None,
                message_count: 0,
                context: HashMap::new(),
            }),
        )
    }

    #[tokio::test]
    async fn test_save_get_round_trip() {
        let store = InMemoryStore::new();
        store.connect().await.unwrap();

        let mut entry = conversation_entry("c1");
        let id = store.save(&mut entry).await.unwrap();

        let fetched = store.get(&id, MemoryType::ShortTerm).await.unwrap().unwrap();
        assert_eq!(fetched.as_conversation().unwrap().conversation_id, "c1");

        // Wrong tier must miss.
        assert!(store.get(&id, MemoryType::User).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_filters_by_conversation() {
        let store = InMemoryStore::new();
        store.connect().await.unwrap();

        for id in ["c1", "c2"] {
            let mut entry = conversation_entry(id);
            store.save(&mut entry).await.unwrap();
        }

        let found = store
            .query(
                MemoryType::ShortTerm,
                "agent-sre",
                &QueryFilters::conversation("c2"),
                10,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_conversation().unwrap().conversation_id, "c2");
    }

    #[tokio::test]
    async fn test_schema_pointer_by_session() {
        let store = InMemoryStore::new();
        store.connect().await.unwrap();

        let mut first = DomainMemorySchema::new("agent-sre", "sre", "sre", "s1", None);
        store.save_schema(&mut first).await.unwrap();
        let mut second = DomainMemorySchema::new("agent-sre", "sre", "sre", "s2", None);
        store.save_schema(&mut second).await.unwrap();

        let resolved = store
            .get_schema_by_agent("agent-sre", Some("s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.schema_id, first.schema_id);

        // Most recently updated wins when no session is given.
        let latest = store
            .get_schema_by_agent("agent-sre", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.schema_id, second.schema_id);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        store.connect().await.unwrap();

        let mut entry = conversation_entry("c1");
        let id = store.save(&mut entry).await.unwrap();
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }
}
