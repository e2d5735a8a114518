//! SQLite implementation of the CacheStore.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::parse_json_or_default;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CacheData, CacheResult};
use crate::domain::ports::CacheStore;

/// Bound parameters per `IN (...)` query.
const ID_CHUNK_SIZE: usize = 500;

#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn rows_for_ids(&self, type_name: &str, ids: &[String], columns: &str) -> DomainResult<Vec<CacheEntryRow>> {
        let mut rows = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {columns} FROM cache_entries WHERE type = ? AND id IN ({placeholders})"
            );
            let mut query = sqlx::query_as::<_, CacheEntryRow>(&sql).bind(type_name);
            for id in chunk {
                query = query.bind(id);
            }
            rows.extend(query.fetch_all(&self.pool).await?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, type_name: &str, id: &str) -> DomainResult<Option<CacheData>> {
        let row: Option<CacheEntryRow> = sqlx::query_as(
            "SELECT id, attributes, relationships FROM cache_entries WHERE type = ? AND id = ?",
        )
        .bind(type_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_all(&self, type_name: &str) -> DomainResult<Vec<CacheData>> {
        let rows: Vec<CacheEntryRow> = sqlx::query_as(
            "SELECT id, attributes, relationships FROM cache_entries WHERE type = ? ORDER BY id",
        )
        .bind(type_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_all_by_ids(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<CacheData>> {
        self.rows_for_ids(type_name, ids, "id, attributes, relationships")
            .await?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn get_identifiers(&self, type_name: &str) -> DomainResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM cache_entries WHERE type = ? ORDER BY id")
            .bind(type_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn filter_identifiers(&self, type_name: &str, glob: &str) -> DomainResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM cache_entries WHERE type = ? AND id GLOB ? ORDER BY id",
        )
        .bind(type_name)
        .bind(glob)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn existing_identifiers(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<String>> {
        let rows = self
            .rows_for_ids(type_name, ids, "id, '{}' AS attributes, '{}' AS relationships")
            .await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    async fn put_cache_data(&self, type_name: &str, data: CacheData) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_entry(&mut conn, type_name, &data).await
    }

    async fn evict(&self, type_name: &str, ids: &[String]) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete_entries(&mut conn, type_name, ids).await
    }

    /// Applies every addition and eviction in one transaction.
    async fn put_cache_result(&self, result: &CacheResult) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        for (type_name, entries) in &result.additions {
            for data in entries {
                upsert_entry(&mut tx, type_name, data).await?;
            }
        }
        for (type_name, ids) in &result.evictions {
            delete_entries(&mut tx, type_name, ids).await?;
        }

        tx.commit().await?;
        debug!(
            additions = result.additions.values().map(Vec::len).sum::<usize>(),
            evictions = result.evictions.values().map(Vec::len).sum::<usize>(),
            "cache result committed"
        );
        Ok(())
    }
}

async fn upsert_entry(conn: &mut SqliteConnection, type_name: &str, data: &CacheData) -> DomainResult<()> {
    let attributes = serde_json::to_string(&data.attributes)?;
    let relationships = serde_json::to_string(&data.relationships)?;

    sqlx::query(
        r"INSERT INTO cache_entries (type, id, attributes, relationships, updated_at)
          VALUES (?, ?, ?, ?, datetime('now'))
          ON CONFLICT(type, id) DO UPDATE SET
            attributes = excluded.attributes,
            relationships = excluded.relationships,
            updated_at = excluded.updated_at",
    )
    .bind(type_name)
    .bind(&data.id)
    .bind(&attributes)
    .bind(&relationships)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn delete_entries(conn: &mut SqliteConnection, type_name: &str, ids: &[String]) -> DomainResult<()> {
    for chunk in ids.chunks(ID_CHUNK_SIZE) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!("DELETE FROM cache_entries WHERE type = ? AND id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(type_name);
        for id in chunk {
            query = query.bind(id);
        }
        query.execute(&mut *conn).await?;
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct CacheEntryRow {
    id: String,
    attributes: Option<String>,
    relationships: Option<String>,
}

impl TryFrom<CacheEntryRow> for CacheData {
    type Error = DomainError;

    fn try_from(row: CacheEntryRow) -> Result<Self, Self::Error> {
        Ok(CacheData {
            id: row.id,
            attributes: parse_json_or_default(row.attributes)?,
            relationships: parse_json_or_default(row.relationships)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use serde_json::json;

    async fn setup_store() -> SqliteCacheStore {
        let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
        SqliteCacheStore::new(pool)
    }

    #[tokio::test]
    async fn test_round_trip_preserves_attributes_and_relationships() {
        let store = setup_store().await;
        let data = CacheData::empty("kubernetes:deployment:acct:ns1:web")
            .with_attribute("replicas", 3)
            .with_attribute("labels", json!({"app": "web"}))
            .with_relationship("pod", "kubernetes:pod:acct:ns1:web-1")
            .with_relationship("pod", "kubernetes:pod:acct:ns1:web-2");

        store.put_cache_data("deployment", data.clone()).await.unwrap();

        assert_eq!(store.get_all("deployment").await.unwrap(), vec![data.clone()]);
        assert_eq!(store.get("deployment", &data.id).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_glob_filter_is_scoped_to_type() {
        let store = setup_store().await;
        store
            .put_cache_data("instances", CacheData::empty("aws:instances:prod:us-east-1:i-1"))
            .await
            .unwrap();
        store
            .put_cache_data("clusters", CacheData::empty("aws:instances:prod:us-east-1:i-9"))
            .await
            .unwrap();

        let ids = store.filter_identifiers("instances", "aws:instances:*:i-?").await.unwrap();
        assert_eq!(ids, vec!["aws:instances:prod:us-east-1:i-1".to_string()]);
    }

    #[tokio::test]
    async fn test_existing_identifiers_and_evict() {
        let store = setup_store().await;
        for id in ["a", "b", "c"] {
            store.put_cache_data("pod", CacheData::empty(id)).await.unwrap();
        }

        store.evict("pod", &["b".to_string(), "zzz".to_string()]).await.unwrap();

        let mut existing = store
            .existing_identifiers("pod", &["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        existing.sort();
        assert_eq!(existing, vec!["a".to_string(), "c".to_string()]);

        let fetched = store.get_all_by_ids("pod", &["c".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, "c");
    }

    #[tokio::test]
    async fn test_put_cache_result_applies_additions_and_evictions() {
        let store = setup_store().await;
        store.put_cache_data("pod", CacheData::empty("old")).await.unwrap();

        let mut result = CacheResult::default();
        result.additions.insert("pod".to_string(), vec![CacheData::empty("new")]);
        result.evictions.insert("pod".to_string(), vec!["old".to_string()]);
        store.put_cache_result(&result).await.unwrap();

        assert_eq!(store.get_identifiers("pod").await.unwrap(), vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_put_cache_result_leaves_store_untouched() {
        let store = setup_store().await;
        store.put_cache_data("pod", CacheData::empty("pinned")).await.unwrap();
        sqlx::query(
            r"CREATE TRIGGER refuse_pinned_delete BEFORE DELETE ON cache_entries
              WHEN OLD.id = 'pinned'
              BEGIN SELECT RAISE(ABORT, 'pinned entry'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let mut result = CacheResult::default();
        result.additions.insert("pod".to_string(), vec![CacheData::empty("added")]);
        result.evictions.insert("pod".to_string(), vec!["pinned".to_string()]);
        assert!(store.put_cache_result(&result).await.is_err());

        assert_eq!(store.get_identifiers("pod").await.unwrap(), vec!["pinned".to_string()]);
        assert!(store.get("pod", "added").await.unwrap().is_none());
    }
}
