//! SQLite-backed agent locks, shared by every node pointing at the same database.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::ports::AgentLockClient;

#[derive(Clone)]
pub struct SqliteAgentLock {
    pool: SqlitePool,
}

impl SqliteAgentLock {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl AgentLockClient for SqliteAgentLock {
    async fn try_acquire(&self, agent_type: &str, owner: &str, ttl: Duration) -> DomainResult<bool> {
        let now = now_ms();
        // Insert, or take over only an expired row; a live row leaves 0 rows affected.
        let result = sqlx::query(
            r"INSERT INTO agent_locks (agent_type, owner, expires_at_ms)
              VALUES (?, ?, ?)
              ON CONFLICT(agent_type) DO UPDATE SET
                owner = excluded.owner,
                expires_at_ms = excluded.expires_at_ms
              WHERE agent_locks.expires_at_ms <= ?",
        )
        .bind(agent_type)
        .bind(owner)
        .bind(now.saturating_add(ttl_ms(ttl)))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_held_by(&self, agent_type: &str, owner: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM agent_locks WHERE agent_type = ? AND owner = ? AND expires_at_ms > ?",
        )
        .bind(agent_type)
        .bind(owner)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn set_ttl(&self, agent_type: &str, owner: &str, ttl: Duration) -> DomainResult<bool> {
        let now = now_ms();
        let result = sqlx::query(
            "UPDATE agent_locks SET expires_at_ms = ? WHERE agent_type = ? AND owner = ? AND expires_at_ms > ?",
        )
        .bind(now.saturating_add(ttl_ms(ttl)))
        .bind(agent_type)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, agent_type: &str, owner: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM agent_locks WHERE agent_type = ? AND owner = ?")
            .bind(agent_type)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
