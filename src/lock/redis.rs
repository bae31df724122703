//! Redis lock manager using bb8 connection pool.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{RedisError, Script};

use crate::db::{RedisPool, prefixed_key, redis_connection};
use crate::lock::{LockManager, LockToken};
use crate::queue::CoordinationError;

static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        else
            return 0
        end
        ",
    )
});

/// `SET NX PX` locks with compare-and-delete release.
pub struct RedisLockManager {
    pool: RedisPool,
    key_prefix: String,
}

impl RedisLockManager {
    pub fn new(pool: RedisPool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }
}

fn operation_error(e: RedisError) -> CoordinationError {
    CoordinationError::Operation(e.to_string())
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn try_acquire(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut conn = redis_connection(&self.pool).await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;

        let reply: Option<String> = redis::cmd("SET")
            .arg(prefixed_key(&self.key_prefix, key))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(conn_ref)
            .await
            .map_err(operation_error)?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, CoordinationError> {
        let mut conn = redis_connection(&self.pool).await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;

        let deleted: i64 = RELEASE_SCRIPT
            .key(prefixed_key(&self.key_prefix, key))
            .arg(token.as_str())
            .invoke_async(conn_ref)
            .await
            .map_err(operation_error)?;

        Ok(deleted == 1)
    }
}
