//! Claiming due jobs from a work index.

use std::sync::Arc;
use std::time::Duration;

use crate::lock::{GLOBAL_PROCESSING_LOCK, LockManager, LockToken};
use crate::models::ScheduledJob;
use crate::queue::{ClaimStrategy, CoordinationError, WorkIndex};

/// Typed front of the work index used by the engine and the tick loop.
///
/// Claimed jobs leave the index whatever happens to them afterwards; the
/// delivery row status stays the source of truth.
#[derive(Clone)]
pub struct ReadyQueue {
    index: Arc<dyn WorkIndex>,
    locks: Arc<dyn LockManager>,
    strategy: ClaimStrategy,
    global_lock_ttl: Duration,
}

impl ReadyQueue {
    pub fn new(
        index: Arc<dyn WorkIndex>,
        locks: Arc<dyn LockManager>,
        strategy: ClaimStrategy,
        global_lock_ttl: Duration,
    ) -> Self {
        Self {
            index,
            locks,
            strategy,
            global_lock_ttl,
        }
    }

    pub fn strategy(&self) -> ClaimStrategy {
        self.strategy
    }

    /// Schedules `job` to become claimable at `due_at_ms`.
    pub async fn schedule(&self, job: &ScheduledJob, due_at_ms: i64) -> Result<(), CoordinationError> {
        let member = job
            .to_member()
            .map_err(|e| CoordinationError::Serialization(e.to_string()))?;
        self.index.enqueue(&member, due_at_ms).await
    }

    /// Claims up to `limit` jobs due at or before `max_due_ms`.
    ///
    /// Returns an empty batch when the global lock is held elsewhere.
    pub async fn claim_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, CoordinationError> {
        let members = match self.strategy {
            ClaimStrategy::Atomic => self.index.pop_ready(max_due_ms, limit).await?,
            ClaimStrategy::LockGuarded => self.claim_under_lock(max_due_ms, limit).await?,
        };

        Ok(members
            .into_iter()
            .filter_map(|member| match ScheduledJob::from_member(&member) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!(member = %member, error = %e, "Dropping malformed scheduled job");
                    None
                }
            })
            .collect())
    }

    /// Number of jobs still waiting in the index.
    pub async fn pending(&self) -> Result<usize, CoordinationError> {
        self.index.len().await
    }

    async fn claim_under_lock(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        let token = LockToken::generate();
        if !self
            .locks
            .try_acquire(GLOBAL_PROCESSING_LOCK, &token, self.global_lock_ttl)
            .await?
        {
            tracing::debug!("Global processing lock held elsewhere, skipping claim");
            return Ok(Vec::new());
        }

        let claimed = self.peek_and_remove(max_due_ms, limit).await;

        if let Err(e) = self.locks.release(GLOBAL_PROCESSING_LOCK, &token).await {
            tracing::warn!(error = %e, "Failed to release global processing lock");
        }

        claimed
    }

    async fn peek_and_remove(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        let members = self.index.range_ready(max_due_ms, limit).await?;
        if !members.is_empty() {
            self.index.remove(&members).await?;
        }
        Ok(members)
    }
}
