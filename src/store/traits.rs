//! DeliveryStore trait definition.

use async_trait::async_trait;
use jiff::Timestamp;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    DeliveryContext, DeliveryFilter, DeliveryPatch, DeliveryStatus, DispatchTarget,
    IntegrationDeliveryCount, Message, MessageCounts, MessageDelivery, NewDelivery, NewMessage,
};

/// Persistence of messages and their deliveries.
///
/// Every status change goes through `update_delivery_if_status`, the only
/// cross-instance guard the scheduler relies on besides the lock manager.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn create_message(&self, new_message: NewMessage) -> AppResult<Message>;

    async fn get_message(&self, id: Uuid) -> AppResult<Message>;

    /// Sets `sent_at` only if it is still null. Returns whether it was set.
    async fn update_message_sent_at_if_null(
        &self,
        message_id: Uuid,
        sent_at: Timestamp,
    ) -> AppResult<bool>;

    /// Inserts all deliveries or none.
    ///
    /// Fails with `AppError::Duplicate` if any (message, integration,
    /// conversation) triple already exists.
    async fn create_deliveries(
        &self,
        deliveries: Vec<NewDelivery>,
    ) -> AppResult<Vec<MessageDelivery>>;

    /// Applies `patch` only while the row's status is one of `expected`.
    ///
    /// Returns the number of rows changed (0 or 1). Guards that cannot reach
    /// `patch.status` under the delivery state machine are rejected.
    async fn update_delivery_if_status(
        &self,
        id: Uuid,
        expected: &[DeliveryStatus],
        patch: &DeliveryPatch,
    ) -> AppResult<usize>;

    /// Oldest-first rows in `status` matching `filter`.
    async fn find_deliveries_by_status(
        &self,
        status: DeliveryStatus,
        filter: &DeliveryFilter,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>>;

    /// `Scheduled` deliveries whose message was due at or before `due_before`,
    /// oldest message first.
    async fn find_overdue_scheduled(
        &self,
        due_before: Timestamp,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>>;

    async fn get_delivery(&self, id: Uuid) -> AppResult<MessageDelivery>;

    async fn list_deliveries_for_message(&self, message_id: Uuid)
    -> AppResult<Vec<MessageDelivery>>;

    /// Delivery counts per status across all of a user's messages.
    async fn count_deliveries_by_status(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<(DeliveryStatus, i64)>>;

    /// Message totals of `user_id`; `scheduled` counts messages due after `now`.
    async fn count_messages(&self, user_id: Uuid, now: Timestamp) -> AppResult<MessageCounts>;

    /// Delivery counts per integration across a user's messages, by integration id.
    async fn count_deliveries_by_integration(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<IntegrationDeliveryCount>>;

    /// Connected integrations of `user_id` with their active conversations.
    ///
    /// `integration_ids` narrows the result when given.
    async fn find_dispatch_targets(
        &self,
        user_id: Uuid,
        integration_ids: Option<&[Uuid]>,
    ) -> AppResult<Vec<DispatchTarget>>;

    async fn load_delivery_context(&self, delivery_id: Uuid) -> AppResult<DeliveryContext>;
}
