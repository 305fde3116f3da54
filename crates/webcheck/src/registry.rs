//! Site registry: the source of monitored sites.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use tracing::warn;

use crate::error::Result;
use crate::pool::RedisPool;
use crate::types::Site;

#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// Every known site, enabled or not.
    async fn list_sites(&self) -> Result<Vec<Site>>;
}

/// Fixed set of sites.
#[derive(Debug, Clone, Default)]
pub struct StaticSiteRegistry {
    sites: Vec<Site>,
}

impl StaticSiteRegistry {
    pub fn new(sites: Vec<Site>) -> Self {
        Self { sites }
    }
}

#[async_trait]
impl SiteRegistry for StaticSiteRegistry {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        Ok(self.sites.clone())
    }
}

/// Sites kept in a Redis hash, one JSON document per field (`HSET sites <id> <json>`).
#[derive(Clone)]
pub struct RedisSiteRegistry {
    pool: RedisPool,
    key: String,
}

impl RedisSiteRegistry {
    pub fn new(pool: RedisPool, key: impl Into<String>) -> Self {
        Self { pool, key: key.into() }
    }
}

#[async_trait]
impl SiteRegistry for RedisSiteRegistry {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        let mut conn = self.pool.get().await?;
        let raw: HashMap<String, String> = conn.hgetall(&self.key).await?;
        Ok(decode_sites(&self.key, raw))
    }
}

/// One bad document must not hide the rest of the registry.
fn decode_sites(key: &str, raw: HashMap<String, String>) -> Vec<Site> {
    let mut sites: Vec<Site> = raw
        .into_iter()
        .filter_map(|(field, json)| match serde_json::from_str::<Site>(&json) {
            Ok(site) => Some(site),
            Err(error) => {
                warn!(key, field = %field, %error, "Skipping undecodable site document");
                None
            }
        })
        .collect();
    sites.sort_by_key(|site| site.id);
    sites
}
