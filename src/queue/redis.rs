//! Redis sorted-set work index using bb8 connection pool.

use std::sync::LazyLock;

use async_trait::async_trait;
use bb8::PooledConnection;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, Script};

use crate::db::{RedisPool, prefixed_key, redis_connection};
use crate::queue::{CoordinationError, WorkIndex};

/// Range-then-remove executed server side so no member is handed out twice.
static POP_READY_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local items = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
        if #items > 0 then
            redis.call('ZREM', KEYS[1], unpack(items))
        end
        return items
        ",
    )
});

/// Work index stored in one Redis sorted set.
pub struct RedisWorkIndex {
    pool: RedisPool,
    key: String,
}

impl RedisWorkIndex {
    pub fn new(pool: RedisPool, key_prefix: &str, queue_key: &str) -> Self {
        Self {
            pool,
            key: prefixed_key(key_prefix, queue_key),
        }
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, Client>, CoordinationError> {
        redis_connection(&self.pool).await
    }
}

fn operation_error(e: RedisError) -> CoordinationError {
    CoordinationError::Operation(e.to_string())
}

#[async_trait]
impl WorkIndex for RedisWorkIndex {
    async fn enqueue(&self, member: &str, due_at_ms: i64) -> Result<(), CoordinationError> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        let _: () = conn_ref
            .zadd(&self.key, member, due_at_ms)
            .await
            .map_err(operation_error)?;
        Ok(())
    }

    async fn range_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .zrangebyscore_limit(&self.key, "-inf", max_due_ms, 0, limit as isize)
            .await
            .map_err(operation_error)
    }

    async fn remove(&self, members: &[String]) -> Result<usize, CoordinationError> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .zrem(&self.key, members)
            .await
            .map_err(operation_error)
    }

    async fn pop_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        POP_READY_SCRIPT
            .key(&self.key)
            .arg(max_due_ms)
            .arg(limit)
            .invoke_async(conn_ref)
            .await
            .map_err(operation_error)
    }

    async fn len(&self) -> Result<usize, CoordinationError> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref.zcard(&self.key).await.map_err(operation_error)
    }
}
