//! Message submission and delivery reporting.

use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::dispatch::{FanoutEngine, RetrySweeper, SweepReport};
use crate::error::{AppError, AppResult};
use crate::models::{
    DeliveryStatus, IntegrationDeliveryCount, Message, MessageDelivery, NewMessage,
};
use crate::store::DeliveryStore;

// ============================================================================
// Request / Response types
// ============================================================================

/// A message to fan out to a user's connected integrations.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 4096, message = "Content must be 1-4096 characters"))]
    pub content: String,
    /// Integration ids to restrict the fan-out to. All connected ones if `None`.
    pub targets: Option<Vec<Uuid>>,
    /// Deferred send time. Must lie in the future.
    pub scheduled_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub message_id: Uuid,
    pub delivery_count: usize,
    pub scheduled_for: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetails {
    pub message: Message,
    pub deliveries: Vec<MessageDelivery>,
}

/// Message and delivery counts across all of a user's messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    pub total_messages: i64,
    /// Deferred messages not yet due.
    pub scheduled_messages: i64,
    /// Messages delivered to at least one conversation.
    pub sent_messages: i64,
    /// Total deliveries.
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    /// Deliveries not yet settled: pending, processing or scheduled.
    pub pending: i64,
    pub failed: i64,
    /// Percentage of deliveries not failed, rounded. Zero without deliveries.
    pub success_rate: i64,
    pub by_integration: Vec<IntegrationDeliveryCount>,
}

impl DeliveryStats {
    fn from_counts(counts: &[(DeliveryStatus, i64)]) -> Self {
        let mut by_status: BTreeMap<String, i64> = DeliveryStatus::ALL
            .iter()
            .map(|status| (status.to_string(), 0))
            .collect();
        for (status, count) in counts {
            *by_status.entry(status.to_string()).or_default() += count;
        }

        let count_of = |status: DeliveryStatus| {
            counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, n)| *n)
                .sum::<i64>()
        };

        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        let failed = count_of(DeliveryStatus::Failed);
        let pending = count_of(DeliveryStatus::Pending)
            + count_of(DeliveryStatus::Processing)
            + count_of(DeliveryStatus::Scheduled);
        let success_rate = if total == 0 {
            0
        } else {
            ((total - failed) as f64 / total as f64 * 100.0).round() as i64
        };

        Self {
            total_messages: 0,
            scheduled_messages: 0,
            sent_messages: 0,
            total,
            by_status,
            pending,
            failed,
            success_rate,
            by_integration: Vec::new(),
        }
    }
}

// ============================================================================
// MessageService
// ============================================================================

/// Entry point for the outer application.
///
/// Cloning is cheap; all collaborators are shared.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn DeliveryStore>,
    engine: FanoutEngine,
    sweeper: Arc<RetrySweeper>,
}

impl MessageService {
    pub fn new(store: Arc<dyn DeliveryStore>, engine: FanoutEngine, sweeper: Arc<RetrySweeper>) -> Self {
        Self {
            store,
            engine,
            sweeper,
        }
    }

    /// Stores a message and fans it out.
    ///
    /// Immediate messages are sent before this returns; failed sends are
    /// recorded on their deliveries and do not fail the submission.
    pub async fn submit(&self, request: SubmitRequest) -> AppResult<SubmitReceipt> {
        let request = SubmitRequest {
            content: request.content.trim().to_string(),
            ..request
        };
        request.validate()?;

        if let Some(at) = request.scheduled_at
            && at <= Timestamp::now()
        {
            return Err(AppError::Validation {
                field: "scheduled_at".to_string(),
                reason: "Scheduled time must be in the future".to_string(),
            });
        }

        let message = self
            .store
            .create_message(NewMessage {
                user_id: request.user_id,
                content: request.content,
                scheduled_for: request.scheduled_at,
            })
            .await?;

        let targets = self
            .store
            .find_dispatch_targets(request.user_id, request.targets.as_deref())
            .await?;
        let report = self.engine.fan_out(&message, &targets).await?;

        tracing::info!(
            message_id = %message.id,
            user_id = %message.user_id,
            delivery_count = report.deliveries.len(),
            sent = report.sent_count(),
            unindexed = report.unindexed,
            "Message submitted"
        );

        Ok(SubmitReceipt {
            message_id: message.id,
            delivery_count: report.deliveries.len(),
            scheduled_for: message.scheduled_for,
        })
    }

    /// Runs one retry sweep now instead of waiting for the next interval.
    pub async fn retry_failed_now(&self) -> AppResult<SweepReport> {
        self.sweeper.run_once().await
    }

    pub async fn message_details(&self, message_id: Uuid) -> AppResult<MessageDetails> {
        let message = self.store.get_message(message_id).await?;
        let deliveries = self.store.list_deliveries_for_message(message_id).await?;
        Ok(MessageDetails {
            message,
            deliveries,
        })
    }

    pub async fn delivery_stats(&self, user_id: Uuid) -> AppResult<DeliveryStats> {
        let counts = self.store.count_deliveries_by_status(user_id).await?;
        let messages = self.store.count_messages(user_id, Timestamp::now()).await?;
        let by_integration = self.store.count_deliveries_by_integration(user_id).await?;

        Ok(DeliveryStats {
            total_messages: messages.total,
            scheduled_messages: messages.scheduled,
            sent_messages: messages.sent,
            by_integration,
            ..DeliveryStats::from_counts(&counts)
        })
    }
}
