//! Lock manager with in-memory and Redis backends.
//!
//! Two lock scopes are used by the scheduler:
//! - a per-job lock `processing_lock:<deliveryId>` held while one delivery is sent
//! - the global `scheduled_messages_processing` lock guarding lock-guarded claims
//!
//! Crash recovery relies on TTL expiry only.

mod memory;
mod redis;
mod traits;

use uuid::Uuid;

pub use memory::MemoryLockManager;
pub use redis::RedisLockManager;
pub use traits::{LockManager, LockToken};

/// Global lock taken around a peek-then-remove claim.
pub const GLOBAL_PROCESSING_LOCK: &str = "scheduled_messages_processing";

/// Per-delivery lock key.
pub fn job_lock_key(delivery_id: Uuid) -> String {
    format!("processing_lock:{}", delivery_id)
}
