//! Redis-backed store for the short-term and working tiers.
//!
//! Keys are namespaced under a configurable prefix:
//! `{prefix}{id}` for entries, `{prefix}index:{agent}:{tier}` secondary
//! index sets, `{prefix}schema:{id}` for schemas, and
//! `{prefix}agent:{agent}:session:{session}` pointer keys resolving the
//! current schema for a session. Entries expire per tier.

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use super::{MemoryError, MemoryStore, QueryFilters};
use crate::schema::DomainMemorySchema;
use crate::types::{MemoryEntry, MemoryType};

const DEFAULT_PREFIX: &str = "agent_memory:";
const DEFAULT_TTL_SECS: u64 = 86_400;
const OP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Fast KV store with per-tier TTL.
pub struct RedisMemoryStore {
    url: String,
    prefix: String,
    default_ttl: u64,
    connection: RwLock<Option<redis::aio::MultiplexedConnection>>,
}

impl RedisMemoryStore {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            default_ttl: DEFAULT_TTL_SECS,
            connection: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    fn entry_key(&self, entry_id: &str) -> String {
        format!("{}{entry_id}", self.prefix)
    }

    fn index_key(&self, agent_id: &str, memory_type: MemoryType) -> String {
        format!("{}index:{agent_id}:{}", self.prefix, memory_type.as_str())
    }

    fn schema_key(&self, schema_id: &str) -> String {
        format!("{}schema:{schema_id}", self.prefix)
    }

    fn agent_schema_key(&self, agent_id: &str, session_id: Option<&str>) -> String {
        match session_id {
            Some(session) => format!("{}agent:{agent_id}:session:{session}", self.prefix),
            None => format!("{}agent:{agent_id}:current", self.prefix),
        }
    }

    /// TTL in seconds for an entry's tier.
    fn ttl_for(&self, memory_type: MemoryType) -> u64 {
        match memory_type {
            MemoryType::ShortTerm => 3_600,
            MemoryType::Working => 86_400,
            MemoryType::Episodic => 604_800,
            _ => self.default_ttl,
        }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, MemoryError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(MemoryError::NotConnected)
    }
}

#[async_trait]
impl MemoryStore for RedisMemoryStore {
    async fn connect(&self) -> Result<(), MemoryError> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| MemoryError::Connection(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection_with_timeouts(OP_TIMEOUT, OP_TIMEOUT)
            .await
            .map_err(|e| MemoryError::Connection(e.to_string()))?;
        *self.connection.write().await = Some(connection);
        tracing::info!(store = "redis", "memory store connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MemoryError> {
        *self.connection.write().await = None;
        tracing::info!(store = "redis", "memory store disconnected");
        Ok(())
    }

    async fn save(&self, entry: &mut MemoryEntry) -> Result<String, MemoryError> {
        let mut conn = self.conn().await?;
        entry.updated_at = Utc::now();

        let payload = serde_json::to_string(entry)?;
        let ttl = self.ttl_for(entry.memory_type());
        let () = conn.set_ex(self.entry_key(&entry.id), payload, ttl).await?;

        let index = self.index_key(&entry.agent_id, entry.memory_type());
        let () = conn.sadd(&index, &entry.id).await?;
        let () = conn.expire(&index, i64::try_from(ttl).unwrap_or(i64::MAX)).await?;

        Ok(entry.id.clone())
    }

    async fn get(
        &self,
        entry_id: &str,
        memory_type: MemoryType,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(self.entry_key(entry_id)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry: MemoryEntry = serde_json::from_str(&raw)?;
        Ok((entry.memory_type() == memory_type).then_some(entry))
    }

    async fn delete(&self, entry_id: &str) -> Result<bool, MemoryError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(self.entry_key(entry_id)).await?;
        Ok(removed > 0)
    }

    async fn query(
        &self,
        memory_type: MemoryType,
        agent_id: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(self.index_key(agent_id, memory_type)).await?;

        let mut results = Vec::new();
        for id in ids {
            let raw: Option<String> = conn.get(self.entry_key(&id)).await?;
            let Some(raw) = raw else {
                // Entry expired out from under the index; drop the stale member.
                let () = conn.srem(self.index_key(agent_id, memory_type), &id).await?;
                continue;
            };
            let entry: MemoryEntry = serde_json::from_str(&raw)?;
            if filters.matches(&entry) {
                results.push(entry);
            }
        }

        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        results.truncate(limit);
        Ok(results)
    }

    async fn save_schema(&self, schema: &mut DomainMemorySchema) -> Result<String, MemoryError> {
        let mut conn = self.conn().await?;
        schema.updated_at = Utc::now();

        let payload = serde_json::to_string(schema)?;
        let () = conn
            .set_ex(self.schema_key(&schema.schema_id), payload, self.default_ttl)
            .await?;

        // Pointer key: the schema saved last is the current one for the session.
        let pointer = self.agent_schema_key(&schema.agent_id, Some(&schema.session_id));
        let () = conn
            .set_ex(pointer, &schema.schema_id, self.default_ttl)
            .await?;
        let current = self.agent_schema_key(&schema.agent_id, None);
        let () = conn
            .set_ex(current, &schema.schema_id, self.default_ttl)
            .await?;

        Ok(schema.schema_id.clone())
    }

    async fn get_schema(
        &self,
        schema_id: &str,
    ) -> Result<Option<DomainMemorySchema>, MemoryError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(self.schema_key(schema_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn get_schema_by_agent(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<DomainMemorySchema>, MemoryError> {
        let mut conn = self.conn().await?;
        let pointer = self.agent_schema_key(agent_id, session_id);
        let schema_id: Option<String> = conn.get(pointer).await?;
        match schema_id {
            Some(schema_id) => self.get_schema(&schema_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let store = RedisMemoryStore::new("redis://localhost:6379/0");
        assert_eq!(store.entry_key("e1"), "agent_memory:e1");
        assert_eq!(
            store.index_key("agent-sre", MemoryType::Working),
            "agent_memory:index:agent-sre:working"
        );
        assert_eq!(store.schema_key("s1"), "agent_memory:schema:s1");
        assert_eq!(
            store.agent_schema_key("agent-sre", Some("sess")),
            "agent_memory:agent:agent-sre:session:sess"
        );
        assert_eq!(
            store.agent_schema_key("agent-sre", None),
            "agent_memory:agent:agent-sre:current"
        );
    }

    #[test]
    fn test_ttl_per_tier() {
        let store = RedisMemoryStore::new("redis://localhost:6379/0");
        assert_eq!(store.ttl_for(MemoryType::ShortTerm), 3_600);
        assert_eq!(store.ttl_for(MemoryType::Working), 86_400);
        assert_eq!(store.ttl_for(MemoryType::Episodic), 604_800);
        assert_eq!(store.ttl_for(MemoryType::User), DEFAULT_TTL_SECS);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let store = RedisMemoryStore::new("redis://localhost:6379/0");
        let err = store.get("e1", MemoryType::ShortTerm).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotConnected));
    }
}
