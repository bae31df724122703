//! Scheduled work index.
//!
//! Deferred deliveries are kept in a sorted set keyed by due time:
//! - `MemoryWorkIndex` for single-process runs and tests
//! - `RedisWorkIndex` for multi-instance deployments
//!
//! `ReadyQueue` claims due jobs with the configured `ClaimStrategy`:
//! `Atomic` relies on the backend's range-and-remove, `LockGuarded` peeks and
//! removes while holding the global processing lock.

mod error;
mod memory;
mod ready;
mod redis;
mod traits;

pub use error::CoordinationError;
pub use memory::MemoryWorkIndex;
pub use ready::ReadyQueue;
pub use redis::RedisWorkIndex;
pub use traits::WorkIndex;

pub use crate::config::settings::ClaimStrategy;
