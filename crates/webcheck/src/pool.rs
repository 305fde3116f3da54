//! Redis connection pool shared by the stream, last-check and registry backends.

use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use tracing::info;

use crate::config::RedisConfig;
use crate::error::Result;

pub type RedisPool = Pool;

/// Build the pool and make sure the server answers before anything else starts.
pub async fn connect(config: &RedisConfig) -> Result<RedisPool> {
    let mut cfg = Config::from_url(&config.url);
    cfg.pool = Some(PoolConfig::new(config.max_connections.max(1)));
    let pool = cfg.create_pool(Some(Runtime::Tokio1))?;

    let mut conn = pool.get().await?;
    let _: String = deadpool_redis::redis::cmd("PING").query_async(&mut conn).await?;

    info!(max_connections = config.max_connections, "Connected to Redis successfully");
    Ok(pool)
}
