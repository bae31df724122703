//! LockManager trait and lock tokens.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::queue::CoordinationError;

/// Opaque owner token stored as the lock value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Fresh `<epoch-millis>_<random>` token.
    pub fn generate() -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(char::from)
            .collect();
        Self(format!(
            "{}_{}",
            jiff::Timestamp::now().as_millisecond(),
            suffix.to_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Distributed mutual exclusion with TTL leases.
///
/// A held lock is released only by the holder of the matching token, or by
/// TTL expiry. Failing to acquire returns `Ok(false)`.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Set `key` to `token` only if absent, expiring after `ttl`.
    async fn try_acquire(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    /// Delete `key` only while it still holds `token`.
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, CoordinationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let token = LockToken::generate();
        let (millis, suffix) = token.as_str().split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert_ne!(token, LockToken::generate());
    }
}
