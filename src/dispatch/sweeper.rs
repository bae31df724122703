//! Re-arming of failed deliveries.

use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use serde::Serialize;

use super::engine::{FanoutEngine, SendDisposition};
use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::models::{DeliveryFilter, DeliveryPatch, DeliveryStatus};
use crate::store::DeliveryStore;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Failed deliveries eligible for retry.
    pub selected: usize,
    /// Eligible deliveries another worker re-armed first.
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Periodically moves eligible `Failed` deliveries back through the send path.
///
/// A delivery is eligible while `retry_count < max_retries` and its last
/// attempt is older than the cool-down (or was never stamped).
pub struct RetrySweeper {
    store: Arc<dyn DeliveryStore>,
    engine: FanoutEngine,
    max_retries: i32,
    cooldown: SignedDuration,
    batch_size: i64,
}

impl RetrySweeper {
    pub fn new(store: Arc<dyn DeliveryStore>, engine: FanoutEngine, config: &SchedulerConfig) -> Self {
        Self {
            store,
            engine,
            max_retries: config.max_retries,
            cooldown: SignedDuration::from_secs(config.retry_cooldown_secs as i64),
            batch_size: config.retry_batch_size,
        }
    }

    pub async fn run_once(&self) -> AppResult<SweepReport> {
        self.run_at(Timestamp::now()).await
    }

    /// Sweeps as if the current time were `now`.
    pub async fn run_at(&self, now: Timestamp) -> AppResult<SweepReport> {
        let cutoff = now.checked_sub(self.cooldown).map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;
        let filter = DeliveryFilter {
            retry_count_below: Some(self.max_retries),
            last_retry_before: Some(cutoff),
        };

        let candidates = self
            .store
            .find_deliveries_by_status(DeliveryStatus::Failed, &filter, self.batch_size)
            .await?;

        let mut report = SweepReport {
            selected: candidates.len(),
            ..SweepReport::default()
        };

        for delivery in candidates {
            let rearmed = self
                .store
                .update_delivery_if_status(
                    delivery.id,
                    &[DeliveryStatus::Failed],
                    &DeliveryPatch::rearm(now),
                )
                .await;
            match rearmed {
                Ok(0) => {
                    report.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(delivery_id = %delivery.id, error = %e, "Failed to re-arm delivery");
                    report.failed += 1;
                    continue;
                }
            }

            tracing::info!(
                delivery_id = %delivery.id,
                message_id = %delivery.message_id,
                retry_count = delivery.retry_count,
                "Retrying failed delivery"
            );

            match self.engine.deliver(delivery.id).await {
                Ok(SendDisposition::Sent { .. }) => report.sent += 1,
                Ok(SendDisposition::Failed { .. }) => report.failed += 1,
                Ok(SendDisposition::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(delivery_id = %delivery.id, error = %e, "Retry failed");
                    report.failed += 1;
                }
            }
        }

        if report.selected > 0 {
            tracing::info!(
                job_count = report.selected,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "Retry sweep finished"
            );
        }

        Ok(report)
    }
}
