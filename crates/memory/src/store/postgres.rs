//! PostgreSQL-backed store for durable tiers and task schemas.
//!
//! Two tables: `memory_entries` and `domain_schemas`, both carrying the
//! serialized record as JSONB with indexed `agent_id`/`memory_type` and
//! session columns for the query paths the manager uses.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

use super::{MemoryError, MemoryStore, QueryFilters};
use crate::schema::DomainMemorySchema;
use crate::types::{MemoryEntry, MemoryType};

const DEFAULT_POOL_SIZE: u32 = 5;
const ACQUIRE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

const INIT_SQL: &str = r"
CREATE TABLE IF NOT EXISTS memory_entries (
    id TEXT PRIMARY KEY,
    memory_type TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    data JSONB NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW(),
    updated_at TIMESTAMPTZ DEFAULT NOW(),
    expires_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_memory_agent_type
ON memory_entries(agent_id, memory_type);

CREATE TABLE IF NOT EXISTS domain_schemas (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    agent_type TEXT NOT NULL,
    session_id TEXT,
    data JSONB NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW(),
    updated_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_schema_agent
ON domain_schemas(agent_id);

CREATE INDEX IF NOT EXISTS idx_schema_agent_session
ON domain_schemas(agent_id, session_id);
";

/// Durable SQL store.
pub struct PostgresMemoryStore {
    url: String,
    pool_size: u32,
    pool: RwLock<Option<PgPool>>,
}

impl PostgresMemoryStore {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            pool: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    async fn pool(&self) -> Result<PgPool, MemoryError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(MemoryError::NotConnected)
    }
}

#[async_trait]
impl MemoryStore for PostgresMemoryStore {
    async fn connect(&self) -> Result<(), MemoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.pool_size)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&self.url)
            .await
            .map_err(|e| MemoryError::Connection(e.to_string()))?;

        sqlx::raw_sql(INIT_SQL).execute(&pool).await?;

        *self.pool.write().await = Some(pool);
        tracing::info!(store = "postgres", pool_size = self.pool_size, "memory store connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MemoryError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        tracing::info!(store = "postgres", "memory store disconnected");
        Ok(())
    }

    async fn save(&self, entry: &mut MemoryEntry) -> Result<String, MemoryError> {
        let pool = self.pool().await?;
        entry.updated_at = Utc::now();

        sqlx::query(
            r"INSERT INTO memory_entries (id, memory_type, agent_id, data, created_at, updated_at, expires_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7)
              ON CONFLICT (id) DO UPDATE SET data = $4, updated_at = $6",
        )
        .bind(&entry.id)
        .bind(entry.memory_type().as_str())
        .bind(&entry.agent_id)
        .bind(Json(&*entry))
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(entry.expires_at)
        .execute(&pool)
        .await?;

        Ok(entry.id.clone())
    }

    async fn get(
        &self,
        entry_id: &str,
        memory_type: MemoryType,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "SELECT data FROM memory_entries WHERE id = $1 AND memory_type = $2",
        )
        .bind(entry_id)
        .bind(memory_type.as_str())
        .fetch_optional(&pool)
        .await?;

        match row {
            Some(row) => {
                let Json(entry): Json<MemoryEntry> = row.try_get("data")?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, entry_id: &str) -> Result<bool, MemoryError> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM memory_entries WHERE id = $1")
            .bind(entry_id)
            .execute(&pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(
        &self,
        memory_type: MemoryType,
        agent_id: &str,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            r"SELECT data FROM memory_entries
              WHERE agent_id = $1 AND memory_type = $2
              ORDER BY updated_at DESC
              LIMIT $3",
        )
        .bind(agent_id)
        .bind(memory_type.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(entry): Json<MemoryEntry> = row.try_get("data")?;
            if filters.matches(&entry) {
                results.push(entry);
            }
        }
        Ok(results)
    }

    async fn save_schema(&self, schema: &mut DomainMemorySchema) -> Result<String, MemoryError> {
        let pool = self.pool().await?;
        schema.updated_at = Utc::now();

        sqlx::query(
            r"INSERT INTO domain_schemas (id, agent_id, agent_type, session_id, data, created_at, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7)
              ON CONFLICT (id) DO UPDATE SET data = $5, updated_at = $7",
        )
        .bind(&schema.schema_id)
        .bind(&schema.agent_id)
        .bind(&schema.agent_type)
        .bind(&schema.session_id)
        .bind(Json(&*schema))
        .bind(schema.created_at)
        .bind(schema.updated_at)
        .execute(&pool)
        .await?;

        Ok(schema.schema_id.clone())
    }

    async fn get_schema(
        &self,
        schema_id: &str,
    ) -> Result<Option<DomainMemorySchema>, MemoryError> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT data FROM domain_schemas WHERE id = $1")
            .bind(schema_id)
            .fetch_optional(&pool)
            .await?;

        match row {
            Some(row) => {
                let Json(schema): Json<DomainMemorySchema> = row.try_get("data")?;
                Ok(Some(schema))
            }
            None => Ok(None),
        }
    }

    async fn get_schema_by_agent(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<DomainMemorySchema>, MemoryError> {
        let pool = self.pool().await?;
        let row = match session_id {
            Some(session) => {
                sqlx::query(
                    r"SELECT data FROM domain_schemas
                      WHERE agent_id = $1 AND session_id = $2
                      ORDER BY updated_at DESC LIMIT 1",
                )
                .bind(agent_id)
                .bind(session)
                .fetch_optional(&pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"SELECT data FROM domain_schemas
                      WHERE agent_id = $1
                      ORDER BY updated_at DESC LIMIT 1",
                )
                .bind(agent_id)
                .fetch_optional(&pool)
                .await?
            }
        };

        match row {
            Some(row) => {
                let Json(schema): Json<DomainMemorySchema> = row.try_get("data")?;
                Ok(Some(schema))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_require_connection() {
        let store = PostgresMemoryStore::new("postgresql://localhost/agent_memory");
        let err = store.get("e1", MemoryType::User).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotConnected));
    }

    #[test]
    fn test_pool_size_override() {
        let store =
            PostgresMemoryStore::new("postgresql://localhost/agent_memory").with_pool_size(10);
        assert_eq!(store.pool_size, 10);
    }
}
