use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::db::{positional, text, Database};
use crate::error::{truncate_message, AppResult};
use crate::services::engine_client::EngineClient;

pub const NODE_CACHE_TTL_SECONDS: i64 = 24 * 60 * 60;
const NODE_TYPES_KEY: &str = "node_types";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: i64,
    pub valid: i64,
    pub expired: i64,
}

/// Read-through cache of engine node types and definitions.
///
/// Rows past `expires_at` are treated as misses even though they remain in
/// the table until overwritten or cleared.
#[derive(Clone)]
pub struct NodeCache {
    db: Database,
    engine: Arc<EngineClient>,
}

impl NodeCache {
    pub fn new(db: Database, engine: Arc<EngineClient>) -> Self {
        Self { db, engine }
    }

    fn definition_key(name: &str) -> String {
        format!("node_def_{}", name)
    }

    pub async fn get_node_types(&self) -> AppResult<Value> {
        if let Some(hit) = self.read(NODE_TYPES_KEY).await {
            return Ok(hit);
        }
        let node_types = self.engine.get_node_types().await?;
        self.write(NODE_TYPES_KEY, &node_types).await;
        Ok(node_types)
    }

    pub async fn get_node_definition(&self, name: &str) -> AppResult<Value> {
        let key = Self::definition_key(name);
        if let Some(hit) = self.read(&key).await {
            return Ok(hit);
        }
        let definition = self.engine.get_node_type(name).await?;
        self.write(&key, &definition).await;
        Ok(definition)
    }

    async fn fetch_row(&self, key: &str) -> Result<Option<(String, i64)>, libsql::Error> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT payload, expires_at FROM engine_cache WHERE cache_key = ?",
                [key],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some((row.get::<String>(0)?, row.get::<i64>(1)?))),
            None => Ok(None),
        }
    }

    // Any read failure is a miss.
    async fn read(&self, key: &str) -> Option<Value> {
        let result = self.fetch_row(key).await;

        match result {
            Ok(Some((payload, expires_at))) if expires_at > Utc::now().timestamp() => {
                serde_json::from_str(&payload).ok()
            }
            Ok(Some(_)) => {
                info!("Engine cache entry {} expired", key);
                None
            }
            Ok(None) => None,
            Err(e) => {
                error!("Error reading engine cache: {}", truncate_message(&e.to_string(), 200));
                None
            }
        }
    }

    async fn write(&self, key: &str, payload: &Value) {
        let now = Utc::now().timestamp();
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let result = conn
            .execute(
                r#"
                INSERT INTO engine_cache (cache_key, payload, expires_at, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (cache_key) DO UPDATE SET
                    payload = excluded.payload,
                    expires_at = excluded.expires_at
                "#,
                positional(vec![
                    text(key),
                    text(&payload.to_string()),
                    libsql::Value::Integer(now + NODE_CACHE_TTL_SECONDS),
                    libsql::Value::Integer(now),
                ]),
            )
            .await;

        match result {
            Ok(_) => info!("Cached engine entry {} for 24h", key),
            Err(e) => error!(
                "Error caching engine entry {}: {}",
                key,
                truncate_message(&e.to_string(), 200)
            ),
        }
    }

    pub async fn clear(&self) -> AppResult<()> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute("DELETE FROM engine_cache", ()).await?;
        info!("Cleared engine cache");
        Ok(())
    }

    pub async fn stats(&self) -> AppResult<CacheStats> {
        let now = Utc::now().timestamp();
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0) FROM engine_cache",
                positional(vec![libsql::Value::Integer(now)]),
            )
            .await?;

        let (total, expired) = match rows.next().await? {
            Some(row) => (row.get::<i64>(0)?, row.get::<i64>(1)?),
            None => (0, 0),
        };

        Ok(CacheStats {
            total,
            valid: total - expired,
            expired,
        })
    }

    #[cfg(test)]
    async fn expire_all(&self) {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute("UPDATE engine_cache SET expires_at = 0", ())
            .await
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{spawn_mock, MockEngine};
    use serde_json::json;

    async fn cache_with_engine() -> (NodeCache, MockEngine) {
        let engine = MockEngine::default();
        engine.set_node_types(json!([{ "name": "n8n-nodes-base.gmail" }]));
        let base = spawn_mock(engine.router()).await;
        let client = EngineClient::new(&base, Some("key".to_string()), 5).unwrap();
        (
            NodeCache::new(Database::in_memory().await, Arc::new(client)),
            engine,
        )
    }

    #[tokio::test]
    async fn test_node_types_are_fetched_once() {
        let (cache, engine) = cache_with_engine().await;

        let first = cache.get_node_types().await.unwrap();
        let second = cache.get_node_types().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.calls().len(), 1);
        assert_eq!(
            cache.stats().await.unwrap(),
            CacheStats { total: 1, valid: 1, expired: 0 }
        );
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_refetch() {
        let (cache, engine) = cache_with_engine().await;
        cache.get_node_definition("n8n-nodes-base.slack").await.unwrap();
        cache.expire_all().await;

        assert_eq!(
            cache.stats().await.unwrap(),
            CacheStats { total: 1, valid: 0, expired: 1 }
        );

        let def = cache.get_node_definition("n8n-nodes-base.slack").await.unwrap();
        assert_eq!(def["name"], "n8n-nodes-base.slack");
        assert_eq!(engine.calls().len(), 2);
        assert_eq!(cache.stats().await.unwrap().valid, 1);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (cache, _engine) = cache_with_engine().await;
        cache.get_node_types().await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.unwrap().total, 0);
    }
}
