//! In-process lock manager.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::lock::{LockManager, LockToken};
use crate::queue::CoordinationError;

struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// Lock table for single-process deployments and tests.
///
/// Expired entries count as absent and are overwritten on the next acquire.
#[derive(Default)]
pub struct MemoryLockManager {
    locks: DashMap<String, HeldLock>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_acquire(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let now = Instant::now();
        let held = HeldLock {
            token: token.as_str().to_string(),
            expires_at: now + ttl,
        };

        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at <= now {
                    entry.insert(held);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(held);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, CoordinationError> {
        let now = Instant::now();
        Ok(self
            .locks
            .remove_if(key, |_, held| {
                held.token == token.as_str() && held.expires_at > now
            })
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let locks = MemoryLockManager::new();
        let a = LockToken::generate();
        let b = LockToken::generate();

        assert!(locks.try_acquire("k", &a, TTL).await.unwrap());
        assert!(!locks.try_acquire("k", &b, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_requires_matching_token() {
        let locks = MemoryLockManager::new();
        let owner = LockToken::generate();
        let other = LockToken::from("other".to_string());

        locks.try_acquire("k", &owner, TTL).await.unwrap();
        assert!(!locks.release("k", &other).await.unwrap());
        assert!(locks.release("k", &owner).await.unwrap());
        assert!(locks.try_acquire("k", &other, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lock_is_reacquirable() {
        let locks = MemoryLockManager::new();
        let crashed = LockToken::generate();
        let next = LockToken::generate();

        locks
            .try_acquire("k", &crashed, Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(locks.try_acquire("k", &next, TTL).await.unwrap());
        assert!(!locks.release("k", &crashed).await.unwrap());
        assert!(locks.release("k", &next).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_of_absent_key() {
        let locks = MemoryLockManager::new();
        assert!(!locks.release("nothing", &LockToken::generate()).await.unwrap());
    }
}
