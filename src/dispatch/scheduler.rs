//! Scheduler tick loop and lifecycle of the background loops.

use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::engine::{FanoutEngine, SendDisposition};
use super::periodic::spawn_periodic;
use super::sweeper::RetrySweeper;
use crate::config::SchedulerConfig;
use crate::error::AppResult;
use crate::lock::{LockManager, LockToken, job_lock_key};
use crate::queue::ReadyQueue;
use crate::store::DeliveryStore;

/// Counts from one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Jobs removed from the work index.
    pub claimed: usize,
    /// Jobs whose per-job lock was held elsewhere.
    pub locked: usize,
    pub sent: usize,
    pub failed: usize,
    /// Jobs whose delivery was no longer claimable.
    pub skipped: usize,
    /// Overdue scheduled deliveries found without an indexed job.
    pub overdue: usize,
}

struct RunningLoops {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Claims due scheduled jobs and sends them, one instance among many.
///
/// Built explicitly with its collaborators; `start` spawns the tick and
/// retry loops and `stop` cancels and joins them.
pub struct DeliveryScheduler {
    queue: ReadyQueue,
    locks: Arc<dyn LockManager>,
    store: Arc<dyn DeliveryStore>,
    engine: FanoutEngine,
    sweeper: Arc<RetrySweeper>,
    config: SchedulerConfig,
    running: Mutex<Option<RunningLoops>>,
}

impl DeliveryScheduler {
    pub fn new(
        queue: ReadyQueue,
        locks: Arc<dyn LockManager>,
        store: Arc<dyn DeliveryStore>,
        engine: FanoutEngine,
        sweeper: Arc<RetrySweeper>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            locks,
            store,
            engine,
            sweeper,
            config,
            running: Mutex::new(None),
        }
    }

    pub async fn tick(&self) -> AppResult<TickReport> {
        self.tick_at(Timestamp::now()).await
    }

    /// Processes jobs due at or before `now`.
    ///
    /// Jobs run one after another; each is sent only while this instance
    /// holds its per-job lock. Afterwards, scheduled deliveries overdue by
    /// more than the grace period are sent the same way, covering rows
    /// whose job never reached the index or was claimed while locked. That
    /// pass also runs when the index cannot be reached.
    pub async fn tick_at(&self, now: Timestamp) -> AppResult<TickReport> {
        let jobs = match self
            .queue
            .claim_ready(now.as_millisecond(), self.config.batch_limit)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim scheduled jobs");
                Vec::new()
            }
        };

        let mut report = TickReport {
            claimed: jobs.len(),
            ..TickReport::default()
        };
        if !jobs.is_empty() {
            tracing::info!(job_count = jobs.len(), "Processing scheduled jobs");
        }

        for job in jobs {
            self.run_job(job.delivery_id, job.message_id, &mut report)
                .await;
        }

        self.send_overdue(now, &mut report).await;

        if report != TickReport::default() {
            tracing::info!(
                job_count = report.claimed,
                overdue = report.overdue,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                locked = report.locked,
                "Scheduler tick finished"
            );
        }
        Ok(report)
    }

    async fn send_overdue(&self, now: Timestamp, report: &mut TickReport) {
        let grace = SignedDuration::from_secs(self.config.overdue_grace_secs as i64);
        let cutoff = match now.checked_sub(grace) {
            Ok(cutoff) => cutoff,
            Err(e) => {
                tracing::error!(error = %e, "Invalid overdue cutoff");
                return;
            }
        };

        let overdue = match self
            .store
            .find_overdue_scheduled(cutoff, self.config.batch_limit as i64)
            .await
        {
            Ok(overdue) => overdue,
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up overdue deliveries");
                return;
            }
        };

        for delivery in overdue {
            tracing::warn!(
                delivery_id = %delivery.id,
                message_id = %delivery.message_id,
                "Sending overdue scheduled delivery"
            );
            report.overdue += 1;
            self.run_job(delivery.id, delivery.message_id, report).await;
        }
    }

    /// Sends one delivery under its per-job lock and tallies the result.
    async fn run_job(&self, delivery_id: Uuid, message_id: Uuid, report: &mut TickReport) {
        let key = job_lock_key(delivery_id);
        let token = LockToken::generate();

        match self
            .locks
            .try_acquire(&key, &token, self.config.job_lock_ttl())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(delivery_id = %delivery_id, "Job locked elsewhere");
                report.locked += 1;
                return;
            }
            Err(e) => {
                tracing::error!(delivery_id = %delivery_id, error = %e, "Failed to acquire job lock");
                report.locked += 1;
                return;
            }
        }

        match self.engine.send_one(delivery_id).await {
            Ok(SendDisposition::Sent { .. }) => report.sent += 1,
            Ok(SendDisposition::Failed { .. }) => report.failed += 1,
            Ok(SendDisposition::Skipped) => report.skipped += 1,
            Err(e) => {
                tracing::error!(
                    delivery_id = %delivery_id,
                    message_id = %message_id,
                    error = %e,
                    "Scheduled send failed"
                );
                report.failed += 1;
            }
        }

        if let Err(e) = self.locks.release(&key, &token).await {
            tracing::warn!(delivery_id = %delivery_id, error = %e, "Failed to release job lock");
        }
    }

    pub fn sweeper(&self) -> &RetrySweeper {
        &self.sweeper
    }

    /// Spawns the tick loop and the retry loop. A second call is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::warn!("Delivery scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();

        let scheduler = Arc::clone(self);
        let tick_loop = spawn_periodic(
            "scheduler_tick",
            self.config.tick_interval(),
            cancel.clone(),
            move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    if let Err(e) = scheduler.tick().await {
                        tracing::error!(error = %e, "Scheduler tick failed");
                    }
                }
            },
        );

        let sweeper = Arc::clone(&self.sweeper);
        let retry_loop = spawn_periodic(
            "retry_sweep",
            self.config.retry_interval(),
            cancel.clone(),
            move || {
                let sweeper = Arc::clone(&sweeper);
                async move {
                    if let Err(e) = sweeper.run_once().await {
                        tracing::error!(error = %e, "Retry sweep failed");
                    }
                }
            },
        );

        tracing::info!(
            tick_interval_secs = self.config.tick_interval_secs,
            retry_interval_secs = self.config.retry_interval_secs,
            claim_strategy = ?self.queue.strategy(),
            "Delivery scheduler started"
        );

        *running = Some(RunningLoops {
            cancel,
            handles: vec![tick_loop, retry_loop],
        });
    }

    /// Stops starting new ticks and waits for running ones to finish.
    pub async fn stop(&self) {
        let Some(loops) = self.running.lock().await.take() else {
            return;
        };

        loops.cancel.cancel();
        for handle in loops.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler loop ended abnormally");
            }
        }
        tracing::info!("Delivery scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
