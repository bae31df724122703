//! In-process work index backed by an ordered set.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::queue::{CoordinationError, WorkIndex};

#[derive(Default)]
struct Entries {
    by_score: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

impl Entries {
    fn ready(&self, max_due_ms: i64, limit: usize) -> Vec<String> {
        self.by_score
            .iter()
            .take_while(|(score, _)| *score <= max_due_ms)
            .take(limit)
            .map(|(_, member)| member.clone())
            .collect()
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.by_score.remove(&(score, member.to_string())),
            None => false,
        }
    }
}

/// Work index for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryWorkIndex {
    entries: Mutex<Entries>,
}

impl MemoryWorkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Entries>, CoordinationError> {
        self.entries
            .lock()
            .map_err(|e| CoordinationError::Operation(e.to_string()))
    }
}

#[async_trait]
impl WorkIndex for MemoryWorkIndex {
    async fn enqueue(&self, member: &str, due_at_ms: i64) -> Result<(), CoordinationError> {
        let mut entries = self.lock()?;
        entries.remove(member);
        entries.by_score.insert((due_at_ms, member.to_string()));
        entries.scores.insert(member.to_string(), due_at_ms);
        Ok(())
    }

    async fn range_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        Ok(self.lock()?.ready(max_due_ms, limit))
    }

    async fn remove(&self, members: &[String]) -> Result<usize, CoordinationError> {
        let mut entries = self.lock()?;
        Ok(members.iter().filter(|m| entries.remove(m)).count())
    }

    async fn pop_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        let mut entries = self.lock()?;
        let ready = entries.ready(max_due_ms, limit);
        for member in &ready {
            entries.remove(member);
        }
        Ok(ready)
    }

    async fn len(&self) -> Result<usize, CoordinationError> {
        Ok(self.lock()?.scores.len())
    }
}
