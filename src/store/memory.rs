//! In-memory delivery store.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use jiff::Timestamp;
use uuid::Uuid;

use crate::error::{AppError, AppResult, DELIVERY_TARGET_CONSTRAINT};
use crate::models::{
    DeliveryContext, DeliveryFilter, DeliveryPatch, DeliveryStatus, DispatchTarget, Integration,
    IntegrationDeliveryCount, Message, MessageCounts, MessageDelivery, NewDelivery, NewMessage,
    SelectedConversation,
};
use crate::store::DeliveryStore;

#[derive(Default)]
struct Tables {
    messages: HashMap<Uuid, Message>,
    integrations: HashMap<Uuid, Integration>,
    conversations: HashMap<Uuid, SelectedConversation>,
    deliveries: HashMap<Uuid, MessageDelivery>,
    targets: HashSet<(Uuid, Uuid, Uuid)>,
}

/// Delivery store kept in process memory.
///
/// All tables sit behind one mutex so each call is atomic, matching the
/// single-statement guarantees of the PostgreSQL store.
#[derive(Default)]
pub struct MemoryDeliveryStore {
    tables: Mutex<Tables>,
}

impl MemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|e| AppError::Internal {
            source: anyhow::anyhow!("delivery store lock poisoned: {}", e),
        })
    }

    /// Registers an integration.
    pub fn insert_integration(&self, integration: Integration) -> AppResult<()> {
        self.tables()?
            .integrations
            .insert(integration.id, integration);
        Ok(())
    }

    /// Registers a conversation, enforcing `(integration_id, external_id)` uniqueness.
    pub fn insert_conversation(&self, conversation: SelectedConversation) -> AppResult<()> {
        let mut tables = self.tables()?;
        if !tables.integrations.contains_key(&conversation.integration_id) {
            return Err(AppError::not_found(
                "integration",
                conversation.integration_id,
            ));
        }
        if tables.conversations.values().any(|c| {
            c.integration_id == conversation.integration_id
                && c.external_id == conversation.external_id
        }) {
            return Err(AppError::Duplicate {
                entity: "selected_conversation".to_string(),
                field: "integration_id,external_id".to_string(),
                value: conversation.external_id,
            });
        }
        tables.conversations.insert(conversation.id, conversation);
        Ok(())
    }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn create_message(&self, new_message: NewMessage) -> AppResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            user_id: new_message.user_id,
            is_scheduled: new_message.is_scheduled(),
            content: new_message.content,
            scheduled_for: new_message.scheduled_for,
            sent_at: None,
            created_at: Timestamp::now(),
        };
        self.tables()?.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Message> {
        self.tables()?
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("message", id))
    }

    async fn update_message_sent_at_if_null(
        &self,
        message_id: Uuid,
        sent_at: Timestamp,
    ) -> AppResult<bool> {
        let mut tables = self.tables()?;
        match tables.messages.get_mut(&message_id) {
            Some(message) if message.sent_at.is_none() => {
                message.sent_at = Some(sent_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_deliveries(
        &self,
        deliveries: Vec<NewDelivery>,
    ) -> AppResult<Vec<MessageDelivery>> {
        let mut tables = self.tables()?;

        let mut batch = HashSet::new();
        for new in &deliveries {
            let key = new.target_key();
            if tables.targets.contains(&key) || !batch.insert(key) {
                return Err(AppError::Duplicate {
                    entity: "message_delivery".to_string(),
                    field: "message_id,integration_id,selected_conversation_id".to_string(),
                    value: DELIVERY_TARGET_CONSTRAINT.to_string(),
                });
            }
        }

        let now = Timestamp::now();
        let created: Vec<MessageDelivery> = deliveries
            .into_iter()
            .map(|new| MessageDelivery {
                id: Uuid::new_v4(),
                message_id: new.message_id,
                integration_id: new.integration_id,
                selected_conversation_id: new.selected_conversation_id,
                status: new.status,
                sent_at: None,
                external_id: None,
                error_message: None,
                retry_count: 0,
                last_retry_at: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        for delivery in &created {
            tables.targets.insert(delivery.target_key());
            tables.deliveries.insert(delivery.id, delivery.clone());
        }
        Ok(created)
    }

    async fn update_delivery_if_status(
        &self,
        id: Uuid,
        expected: &[DeliveryStatus],
        patch: &DeliveryPatch,
    ) -> AppResult<usize> {
        patch.check_transition(expected)?;

        let mut tables = self.tables()?;
        match tables.deliveries.get_mut(&id) {
            Some(delivery) if expected.contains(&delivery.status) => {
                patch.apply(delivery, Timestamp::now());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_deliveries_by_status(
        &self,
        status: DeliveryStatus,
        filter: &DeliveryFilter,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        let tables = self.tables()?;
        let mut found: Vec<MessageDelivery> = tables
            .deliveries
            .values()
            .filter(|d| d.status == status && filter.matches(d))
            .cloned()
            .collect();
        found.sort_by_key(|d| (d.created_at, d.id));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn find_overdue_scheduled(
        &self,
        due_before: Timestamp,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        let tables = self.tables()?;
        let mut found: Vec<(Timestamp, MessageDelivery)> = tables
            .deliveries
            .values()
            .filter(|d| d.status == DeliveryStatus::Scheduled)
            .filter_map(|d| {
                let due = tables.messages.get(&d.message_id)?.scheduled_for?;
                (due <= due_before).then(|| (due, d.clone()))
            })
            .collect();
        found.sort_by_key(|(due, d)| (*due, d.created_at, d.id));
        found.truncate(limit.max(0) as usize);
        Ok(found.into_iter().map(|(_, d)| d).collect())
    }

    async fn get_delivery(&self, id: Uuid) -> AppResult<MessageDelivery> {
        self.tables()?
            .deliveries
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("message_delivery", id))
    }

    async fn list_deliveries_for_message(
        &self,
        message_id: Uuid,
    ) -> AppResult<Vec<MessageDelivery>> {
        let tables = self.tables()?;
        let mut found: Vec<MessageDelivery> = tables
            .deliveries
            .values()
            .filter(|d| d.message_id == message_id)
            .cloned()
            .collect();
        found.sort_by_key(|d| (d.created_at, d.id));
        Ok(found)
    }

    async fn count_deliveries_by_status(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<(DeliveryStatus, i64)>> {
        let tables = self.tables()?;
        let mut counts: HashMap<DeliveryStatus, i64> = HashMap::new();
        for delivery in tables.deliveries.values() {
            let owned = tables
                .messages
                .get(&delivery.message_id)
                .is_some_and(|m| m.user_id == user_id);
            if owned {
                *counts.entry(delivery.status).or_default() += 1;
            }
        }
        Ok(DeliveryStatus::ALL
            .iter()
            .filter_map(|status| counts.get(status).map(|n| (*status, *n)))
            .collect())
    }

    async fn count_messages(&self, user_id: Uuid, now: Timestamp) -> AppResult<MessageCounts> {
        let tables = self.tables()?;
        let mut counts = MessageCounts::default();
        for message in tables.messages.values().filter(|m| m.user_id == user_id) {
            counts.total += 1;
            if message.is_scheduled && message.scheduled_for.is_some_and(|at| at > now) {
                counts.scheduled += 1;
            }
            if message.sent_at.is_some() {
                counts.sent += 1;
            }
        }
        Ok(counts)
    }

    async fn count_deliveries_by_integration(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<IntegrationDeliveryCount>> {
        let tables = self.tables()?;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for delivery in tables.deliveries.values() {
            let owned = tables
                .messages
                .get(&delivery.message_id)
                .is_some_and(|m| m.user_id == user_id);
            if owned {
                *counts.entry(delivery.integration_id).or_default() += 1;
            }
        }

        let mut found: Vec<IntegrationDeliveryCount> = counts
            .into_iter()
            .filter_map(|(integration_id, deliveries)| {
                let integration = tables.integrations.get(&integration_id)?;
                Some(IntegrationDeliveryCount {
                    integration_id,
                    name: integration.name.clone(),
                    platform: integration.platform,
                    deliveries,
                })
            })
            .collect();
        found.sort_by_key(|c| c.integration_id);
        Ok(found)
    }

    async fn find_dispatch_targets(
        &self,
        user_id: Uuid,
        integration_ids: Option<&[Uuid]>,
    ) -> AppResult<Vec<DispatchTarget>> {
        let tables = self.tables()?;
        let mut integrations: Vec<&Integration> = tables
            .integrations
            .values()
            .filter(|i| i.user_id == user_id && i.is_connected())
            .filter(|i| integration_ids.is_none_or(|ids| ids.contains(&i.id)))
            .collect();
        integrations.sort_by_key(|i| i.id);

        Ok(integrations
            .into_iter()
            .map(|integration| {
                let mut conversations: Vec<SelectedConversation> = tables
                    .conversations
                    .values()
                    .filter(|c| c.integration_id == integration.id && c.active)
                    .cloned()
                    .collect();
                conversations.sort_by_key(|c| (c.created_at, c.id));
                DispatchTarget {
                    integration: integration.clone(),
                    conversations,
                }
            })
            .collect())
    }

    async fn load_delivery_context(&self, delivery_id: Uuid) -> AppResult<DeliveryContext> {
        let tables = self.tables()?;
        let delivery = tables
            .deliveries
            .get(&delivery_id)
            .ok_or_else(|| AppError::not_found("message_delivery", delivery_id))?;
        let message = tables
            .messages
            .get(&delivery.message_id)
            .ok_or_else(|| AppError::not_found("message", delivery.message_id))?;
        let integration = tables
            .integrations
            .get(&delivery.integration_id)
            .ok_or_else(|| AppError::not_found("integration", delivery.integration_id))?;
        let conversation = tables
            .conversations
            .get(&delivery.selected_conversation_id)
            .ok_or_else(|| {
                AppError::not_found("selected_conversation", delivery.selected_conversation_id)
            })?;

        Ok(DeliveryContext {
            delivery: delivery.clone(),
            content: message.content.clone(),
            platform: integration.platform,
            integration_config: integration.config.clone(),
            conversation_external_id: conversation.external_id.clone(),
        })
    }
}
