//! PostgreSQL implementation of `DeliveryStore`.

use async_trait::async_trait;
use jiff::Timestamp;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    DeliveryContext, DeliveryFilter, DeliveryPatch, DeliveryStatus, DispatchTarget,
    IntegrationDeliveryCount, Message, MessageCounts, MessageDelivery, NewDelivery, NewMessage,
};
use crate::repositories::Repositories;
use crate::store::DeliveryStore;

/// Delivery store backed by the repositories.
#[derive(Clone)]
pub struct PgDeliveryStore {
    repos: Repositories,
}

impl PgDeliveryStore {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn create_message(&self, new_message: NewMessage) -> AppResult<Message> {
        self.repos.messages.create(new_message).await
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Message> {
        self.repos
            .messages
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("message", id))
    }

    async fn update_message_sent_at_if_null(
        &self,
        message_id: Uuid,
        sent_at: Timestamp,
    ) -> AppResult<bool> {
        self.repos
            .messages
            .set_sent_at_if_null(message_id, sent_at)
            .await
    }

    async fn create_deliveries(
        &self,
        deliveries: Vec<NewDelivery>,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.repos.deliveries.create_batch(deliveries).await
    }

    async fn update_delivery_if_status(
        &self,
        id: Uuid,
        expected: &[DeliveryStatus],
        patch: &DeliveryPatch,
    ) -> AppResult<usize> {
        patch.check_transition(expected)?;
        self.repos
            .deliveries
            .update_if_status(id, expected, patch)
            .await
    }

    async fn find_deliveries_by_status(
        &self,
        status: DeliveryStatus,
        filter: &DeliveryFilter,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.repos
            .deliveries
            .find_by_status(status, filter, limit)
            .await
    }

    async fn find_overdue_scheduled(
        &self,
        due_before: Timestamp,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.repos
            .deliveries
            .find_overdue_scheduled(due_before, limit)
            .await
    }

    async fn get_delivery(&self, id: Uuid) -> AppResult<MessageDelivery> {
        self.repos
            .deliveries
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("message_delivery", id))
    }

    async fn list_deliveries_for_message(
        &self,
        message_id: Uuid,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.repos.deliveries.find_by_message_id(message_id).await
    }

    async fn count_deliveries_by_status(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<(DeliveryStatus, i64)>> {
        self.repos.deliveries.count_by_status_for_user(user_id).await
    }

    async fn count_messages(&self, user_id: Uuid, now: Timestamp) -> AppResult<MessageCounts> {
        self.repos.messages.count_for_user(user_id, now).await
    }

    async fn count_deliveries_by_integration(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<IntegrationDeliveryCount>> {
        self.repos
            .deliveries
            .count_by_integration_for_user(user_id)
            .await
    }

    async fn find_dispatch_targets(
        &self,
        user_id: Uuid,
        integration_ids: Option<&[Uuid]>,
    ) -> AppResult<Vec<DispatchTarget>> {
        self.repos
            .integrations
            .find_dispatch_targets(user_id, integration_ids)
            .await
    }

    async fn load_delivery_context(&self, delivery_id: Uuid) -> AppResult<DeliveryContext> {
        self.repos
            .integrations
            .find_delivery_context(delivery_id)
            .await?
            .ok_or_else(|| AppError::not_found("message_delivery", delivery_id))
    }
}
