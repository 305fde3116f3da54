//! Last-check store: unix second of the last successfully enqueued check per site.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::error::{Result, WebcheckError};
use crate::pool::RedisPool;

#[async_trait]
pub trait LastCheckStore: Send + Sync {
    /// `None` when the site has never been enqueued.
    async fn get(&self, site_id: i64) -> Result<Option<i64>>;

    async fn set(&self, site_id: i64, timestamp: i64) -> Result<()>;
}

/// Plain string keys, `last_check:{id}` by default, no expiry.
#[derive(Clone)]
pub struct RedisLastCheckStore {
    pool: RedisPool,
    key_prefix: String,
}

impl RedisLastCheckStore {
    pub fn new(pool: RedisPool, key_prefix: impl Into<String>) -> Self {
        Self { pool, key_prefix: key_prefix.into() }
    }

    fn key(&self, site_id: i64) -> String {
        format!("{}{}", self.key_prefix, site_id)
    }
}

#[async_trait]
impl LastCheckStore for RedisLastCheckStore {
    async fn get(&self, site_id: i64) -> Result<Option<i64>> {
        let mut conn = self.pool.get().await?;
        let key = self.key(site_id);
        let raw: Option<String> = conn.get(&key).await?;

        match raw {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| WebcheckError::CorruptRecord { key, value }),
        }
    }

    async fn set(&self, site_id: i64, timestamp: i64) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let () = conn.set(self.key(site_id), timestamp).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLastCheckStore {
    records: Arc<RwLock<HashMap<i64, i64>>>,
}

impl MemoryLastCheckStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LastCheckStore for MemoryLastCheckStore {
    async fn get(&self, site_id: i64) -> Result<Option<i64>> {
        Ok(self.records.read().await.get(&site_id).copied())
    }

    async fn set(&self, site_id: i64, timestamp: i64) -> Result<()> {
        self.records.write().await.insert(site_id, timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryLastCheckStore::new();
        assert_eq!(store.get(1).await.unwrap(), None);

        store.set(1, 1_700_000_000).await.unwrap();
        store.set(1, 1_700_000_300).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), Some(1_700_000_300));
        assert_eq!(store.get(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryLastCheckStore::new();
        let other = store.clone();
        store.set(4, 10).await.unwrap();
        assert_eq!(other.get(4).await.unwrap(), Some(10));
    }
}
