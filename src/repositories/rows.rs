//! Diesel row types and their conversions to domain models.
//!
//! Timestamps cross the database boundary as `jiff_diesel::Timestamp`
//! (`timestamptz`) and are `jiff::Timestamp` everywhere else.

use diesel::prelude::*;
use jiff_diesel::{Timestamp as DbTimestamp, ToDiesel};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::{
    DeliveryPatch, DeliveryStatus, Integration, IntegrationStatus, Message, MessageDelivery,
    NewDelivery, NewMessage, PlatformKind, SelectedConversation,
};
use crate::schema::{integrations, message_deliveries, messages, selected_conversations};

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub is_scheduled: bool,
    pub scheduled_for: Option<DbTimestamp>,
    pub sent_at: Option<DbTimestamp>,
    pub created_at: DbTimestamp,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            is_scheduled: row.is_scheduled,
            scheduled_for: row.scheduled_for.map(|t| t.to_jiff()),
            sent_at: row.sent_at.map(|t| t.to_jiff()),
            created_at: row.created_at.to_jiff(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessageRow {
    pub user_id: Uuid,
    pub content: String,
    pub is_scheduled: bool,
    pub scheduled_for: Option<DbTimestamp>,
}

impl From<NewMessage> for NewMessageRow {
    fn from(new: NewMessage) -> Self {
        NewMessageRow {
            user_id: new.user_id,
            is_scheduled: new.is_scheduled(),
            content: new.content,
            scheduled_for: new.scheduled_for.map(|t| t.to_diesel()),
        }
    }
}

// ============================================================================
// Deliveries
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = message_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeliveryRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub integration_id: Uuid,
    pub selected_conversation_id: Uuid,
    pub status: DeliveryStatus,
    pub sent_at: Option<DbTimestamp>,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub last_retry_at: Option<DbTimestamp>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl From<DeliveryRow> for MessageDelivery {
    fn from(row: DeliveryRow) -> Self {
        MessageDelivery {
            id: row.id,
            message_id: row.message_id,
            integration_id: row.integration_id,
            selected_conversation_id: row.selected_conversation_id,
            status: row.status,
            sent_at: row.sent_at.map(|t| t.to_jiff()),
            external_id: row.external_id,
            error_message: row.error_message,
            retry_count: row.retry_count,
            last_retry_at: row.last_retry_at.map(|t| t.to_jiff()),
            created_at: row.created_at.to_jiff(),
            updated_at: row.updated_at.to_jiff(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = message_deliveries)]
pub struct NewDeliveryRow {
    pub message_id: Uuid,
    pub integration_id: Uuid,
    pub selected_conversation_id: Uuid,
    pub status: DeliveryStatus,
}

impl From<NewDelivery> for NewDeliveryRow {
    fn from(new: NewDelivery) -> Self {
        NewDeliveryRow {
            message_id: new.message_id,
            integration_id: new.integration_id,
            selected_conversation_id: new.selected_conversation_id,
            status: new.status,
        }
    }
}

/// Column changes of a guarded update; `retry_count` is set separately.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = message_deliveries)]
pub struct DeliveryChangeset {
    pub status: DeliveryStatus,
    pub sent_at: Option<DbTimestamp>,
    pub external_id: Option<String>,
    pub error_message: Option<Option<String>>,
    pub last_retry_at: Option<DbTimestamp>,
    pub updated_at: DbTimestamp,
}

impl DeliveryChangeset {
    pub fn from_patch(patch: &DeliveryPatch, now: jiff::Timestamp) -> Self {
        DeliveryChangeset {
            status: patch.status,
            sent_at: patch.sent_at.map(|t| t.to_diesel()),
            external_id: patch.external_id.clone(),
            error_message: patch.error_message.clone(),
            last_retry_at: patch.last_retry_at.map(|t| t.to_diesel()),
            updated_at: now.to_diesel(),
        }
    }
}

// ============================================================================
// Integrations / conversations
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = integrations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct IntegrationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub platform: PlatformKind,
    pub status: IntegrationStatus,
    pub config: JsonValue,
}

impl From<IntegrationRow> for Integration {
    fn from(row: IntegrationRow) -> Self {
        Integration {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            platform: row.platform,
            status: row.status,
            config: row.config,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = selected_conversations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ConversationRow {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub conversation_type: String,
    pub active: bool,
    pub created_at: DbTimestamp,
}

impl From<ConversationRow> for SelectedConversation {
    fn from(row: ConversationRow) -> Self {
        SelectedConversation {
            id: row.id,
            integration_id: row.integration_id,
            external_id: row.external_id,
            name: row.name,
            conversation_type: row.conversation_type,
            active: row.active,
            created_at: row.created_at.to_jiff(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_from_failed_patch() {
        let now = jiff::Timestamp::now();
        let changeset = DeliveryChangeset::from_patch(&DeliveryPatch::failed("timeout", now), now);
        assert_eq!(changeset.status, DeliveryStatus::Failed);
        assert_eq!(changeset.error_message, Some(Some("timeout".to_string())));
        assert!(changeset.last_retry_at.is_some());
        assert!(changeset.sent_at.is_none());
    }

    #[test]
    fn test_new_message_row_marks_schedule() {
        let row = NewMessageRow::from(NewMessage {
            user_id: Uuid::new_v4(),
            content: "later".to_string(),
            scheduled_for: Some(jiff::Timestamp::now()),
        });
        assert!(row.is_scheduled);
    }
}
