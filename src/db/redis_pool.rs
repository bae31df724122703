//! Redis connection pool shared by the work index and lock manager.

use bb8::{Pool, PooledConnection};
use redis::Client;

use crate::config::settings::RedisConfig;
use crate::queue::CoordinationError;

/// bb8 pool of multiplexed Redis connections.
pub type RedisPool = Pool<Client>;

/// Builds a Redis pool from configuration.
pub async fn create_redis_pool(config: &RedisConfig) -> Result<RedisPool, CoordinationError> {
    let client = Client::open(config.url.as_str())
        .map_err(|e| CoordinationError::Connection(e.to_string()))?;

    Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(std::time::Duration::from_secs(config.connection_timeout))
        .build(client)
        .await
        .map_err(|e| CoordinationError::Connection(e.to_string()))
}

/// Checks out a connection, mapping pool errors to `CoordinationError`.
pub async fn redis_connection(
    pool: &RedisPool,
) -> Result<PooledConnection<'_, Client>, CoordinationError> {
    pool.get()
        .await
        .map_err(|e| CoordinationError::Connection(e.to_string()))
}

/// Joins the configured prefix and a key with `:`; an empty prefix leaves the key as is.
pub fn prefixed_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}
