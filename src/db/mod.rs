//! Connection pools.
//!
//! PostgreSQL through diesel_async with bb8, and Redis through bb8 for the
//! work index and lock manager.

mod pool;
mod redis_pool;

pub use pool::{AsyncDbPool, MIGRATIONS, establish_async_connection_pool};
pub use redis_pool::{RedisPool, create_redis_pool, prefixed_key, redis_connection};
