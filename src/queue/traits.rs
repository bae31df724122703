//! WorkIndex trait definition.

use async_trait::async_trait;

use crate::queue::CoordinationError;

/// Sorted set of opaque members scored by due time in epoch milliseconds.
///
/// Members are unique; enqueueing an existing member updates its score.
#[async_trait]
pub trait WorkIndex: Send + Sync {
    /// Add or re-score a member.
    async fn enqueue(&self, member: &str, due_at_ms: i64) -> Result<(), CoordinationError>;

    /// Peek up to `limit` members with score `<= max_due_ms`, earliest first.
    async fn range_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError>;

    /// Remove members, returning how many were present.
    async fn remove(&self, members: &[String]) -> Result<usize, CoordinationError>;

    /// Range and remove in one atomic step.
    ///
    /// Backends without a native atomic form keep the default, and callers
    /// must fall back to a lock-guarded peek and remove.
    async fn pop_ready(
        &self,
        _max_due_ms: i64,
        _limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        Err(CoordinationError::Unsupported("pop_ready"))
    }

    /// Number of members currently held.
    async fn len(&self) -> Result<usize, CoordinationError>;
}
