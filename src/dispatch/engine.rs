//! Fan-out of one message to its deliveries and the single-delivery send path.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use jiff::Timestamp;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    DeliveryContext, DeliveryPatch, DeliveryStatus, DispatchTarget, Message, MessageDelivery,
    NewDelivery, ScheduledJob,
};
use crate::platforms::{AdapterRegistry, SendOutcome};
use crate::queue::ReadyQueue;
use crate::store::DeliveryStore;

/// What happened to one delivery on a send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendDisposition {
    Sent { external_id: Option<String> },
    Failed { error: String },
    /// Another worker owned the delivery; nothing was sent.
    Skipped,
}

/// Result of fanning out one message.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    pub deliveries: Vec<MessageDelivery>,
    /// Per-delivery result of immediate sends. Empty for deferred messages.
    pub outcomes: Vec<(Uuid, SendDisposition)>,
    /// Deferred deliveries whose job could not be indexed. The tick picks
    /// them up once they are overdue.
    pub unindexed: usize,
}

impl FanoutReport {
    pub fn sent_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, d)| matches!(d, SendDisposition::Sent { .. }))
            .count()
    }
}

/// Creates deliveries for a message and drives each through the state machine.
///
/// Cloning is cheap; spawned send tasks hold their own clone.
#[derive(Clone)]
pub struct FanoutEngine {
    store: Arc<dyn DeliveryStore>,
    queue: ReadyQueue,
    registry: Arc<AdapterRegistry>,
}

impl FanoutEngine {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        queue: ReadyQueue,
        registry: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
        }
    }

    /// Creates one delivery per connected integration and active conversation.
    ///
    /// Deferred messages are pushed to the work index at their due time;
    /// immediate ones are sent concurrently before returning.
    pub async fn fan_out(
        &self,
        message: &Message,
        targets: &[DispatchTarget],
    ) -> AppResult<FanoutReport> {
        let status = if message.is_scheduled {
            DeliveryStatus::Scheduled
        } else {
            DeliveryStatus::Pending
        };

        let mut seen = HashSet::new();
        let new_deliveries: Vec<NewDelivery> = targets
            .iter()
            .filter(|target| target.integration.is_connected())
            .flat_map(|target| {
                target
                    .conversations
                    .iter()
                    .filter(|c| c.active)
                    .map(move |c| (target.integration.id, c.id))
            })
            .filter(|key| seen.insert(*key))
            .map(|(integration_id, conversation_id)| NewDelivery {
                message_id: message.id,
                integration_id,
                selected_conversation_id: conversation_id,
                status,
            })
            .collect();

        if new_deliveries.is_empty() {
            tracing::info!(message_id = %message.id, "Message has no delivery targets");
            return Ok(FanoutReport::default());
        }

        let deliveries = self.store.create_deliveries(new_deliveries).await?;
        tracing::info!(
            message_id = %message.id,
            delivery_count = deliveries.len(),
            scheduled = message.is_scheduled,
            "Created deliveries"
        );

        if let Some(due_at_ms) = message.due_at_millis().filter(|_| message.is_scheduled) {
            let mut unindexed = 0;
            for delivery in &deliveries {
                let job = ScheduledJob {
                    message_id: message.id,
                    delivery_id: delivery.id,
                };
                if let Err(e) = self.queue.schedule(&job, due_at_ms).await {
                    tracing::error!(
                        message_id = %message.id,
                        delivery_id = %delivery.id,
                        error = %e,
                        "Failed to index scheduled delivery"
                    );
                    unindexed += 1;
                }
            }
            return Ok(FanoutReport {
                deliveries,
                outcomes: Vec::new(),
                unindexed,
            });
        }

        let outcomes = self.send_all(&deliveries).await;
        Ok(FanoutReport {
            deliveries,
            outcomes,
            unindexed: 0,
        })
    }

    /// Sends every delivery in its own task and collects the results.
    async fn send_all(&self, deliveries: &[MessageDelivery]) -> Vec<(Uuid, SendDisposition)> {
        let handles: Vec<_> = deliveries
            .iter()
            .map(|delivery| {
                let engine = self.clone();
                let delivery_id = delivery.id;
                (
                    delivery_id,
                    tokio::spawn(async move { engine.send_one(delivery_id).await }),
                )
            })
            .collect();

        let (ids, tasks): (Vec<Uuid>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(tasks).await;

        ids.into_iter()
            .zip(results)
            .map(|(delivery_id, result)| {
                let disposition = match result {
                    Ok(Ok(disposition)) => disposition,
                    Ok(Err(e)) => {
                        tracing::error!(delivery_id = %delivery_id, error = %e, "Send task failed");
                        SendDisposition::Failed {
                            error: e.to_string(),
                        }
                    }
                    Err(e) => {
                        tracing::error!(delivery_id = %delivery_id, error = %e, "Send task aborted");
                        SendDisposition::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                (delivery_id, disposition)
            })
            .collect()
    }

    /// Claims a pending or scheduled delivery and sends it.
    ///
    /// Returns `Skipped` without side effects when the delivery is no longer
    /// claimable, e.g. already sent or owned by another worker.
    pub async fn send_one(&self, delivery_id: Uuid) -> AppResult<SendDisposition> {
        let claimed = self
            .store
            .update_delivery_if_status(delivery_id, &DeliveryStatus::CLAIMABLE, &DeliveryPatch::claim())
            .await?;

        if claimed == 0 {
            tracing::debug!(delivery_id = %delivery_id, "Delivery not claimable, skipping");
            return Ok(SendDisposition::Skipped);
        }

        self.deliver(delivery_id).await
    }

    /// Sends a delivery already in `Processing` and records the result.
    pub async fn deliver(&self, delivery_id: Uuid) -> AppResult<SendDisposition> {
        let context = match self.store.load_delivery_context(delivery_id).await {
            Ok(context) => context,
            Err(e) => {
                return self
                    .record_failure(delivery_id, format!("Failed to load delivery: {}", e))
                    .await;
            }
        };

        let outcome = match self.invoke_adapter(&context).await {
            Ok(outcome) => outcome,
            Err(error) => return self.record_failure(delivery_id, error).await,
        };

        if outcome.success {
            self.record_success(&context, outcome.external_id).await
        } else {
            let error = outcome.error.unwrap_or_else(|| "Unknown error".to_string());
            self.record_failure(delivery_id, error).await
        }
    }

    /// Resolves and calls the adapter; every failure mode becomes an error text.
    async fn invoke_adapter(&self, context: &DeliveryContext) -> Result<SendOutcome, String> {
        let adapter = self
            .registry
            .resolve(context.platform, &context.integration_config)
            .map_err(|e| format!("Integration misconfigured: {}", e))?;

        let send = adapter.send(&context.conversation_external_id, &context.content);
        match AssertUnwindSafe(send).catch_unwind().await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(format!("Adapter panicked: {}", panic_message(panic.as_ref()))),
        }
    }

    async fn record_success(
        &self,
        context: &DeliveryContext,
        external_id: Option<String>,
    ) -> AppResult<SendDisposition> {
        let delivery = &context.delivery;
        let now = Timestamp::now();
        let updated = self
            .store
            .update_delivery_if_status(
                delivery.id,
                &[DeliveryStatus::Processing],
                &DeliveryPatch::sent(external_id.clone(), now),
            )
            .await?;
        if updated == 0 {
            tracing::warn!(delivery_id = %delivery.id, "Delivery left PROCESSING during send");
        }

        if self
            .store
            .update_message_sent_at_if_null(delivery.message_id, now)
            .await?
        {
            tracing::debug!(message_id = %delivery.message_id, "Message marked as sent");
        }

        tracing::info!(
            delivery_id = %delivery.id,
            message_id = %delivery.message_id,
            external_id = external_id.as_deref().unwrap_or_default(),
            "Delivery sent"
        );
        Ok(SendDisposition::Sent { external_id })
    }

    async fn record_failure(&self, delivery_id: Uuid, error: String) -> AppResult<SendDisposition> {
        tracing::warn!(delivery_id = %delivery_id, error = %error, "Delivery failed");
        self.store
            .update_delivery_if_status(
                delivery_id,
                &[DeliveryStatus::Processing],
                &DeliveryPatch::failed(error.clone(), Timestamp::now()),
            )
            .await?;
        Ok(SendDisposition::Failed { error })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
