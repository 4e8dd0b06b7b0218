use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AppResult;

/// Expiring key-value store used for short-lived OAuth state.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Read and remove `key` in one step; at most one caller sees the value.
    async fn take(&self, key: &str) -> AppResult<Option<String>>;
}

pub struct RedisCache {
    pool: deadpool_redis::Pool,
}

impl RedisCache {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get_del(key).await?;
        Ok(value)
    }
}

/// Process-local fallback when Redis is disabled.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries.insert(
            key.to_string(),
            (value.to_string(), now + Duration::from_secs(ttl_seconds)),
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> AppResult<Option<String>> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(value, _)| value))
    }
}
