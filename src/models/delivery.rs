//! Delivery models and the delivery state machine.

use diesel_derive_enum::DbEnum;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Integration, PlatformKind, SelectedConversation};

// ============================================================================
// DeliveryStatus
// ============================================================================

/// Lifecycle state of one message delivery.
///
/// ```text
/// Scheduled ─┐
///            ├─> Processing ─┬─> Sent
/// Pending ───┘       ^       └─> Failed
///                    └──────────────┘ (retry sweep)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::DeliveryStatus")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Scheduled,
    Pending,
    Processing,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Scheduled,
        DeliveryStatus::Pending,
        DeliveryStatus::Processing,
        DeliveryStatus::Sent,
        DeliveryStatus::Failed,
    ];

    /// Statuses a fresh send may claim from.
    pub const CLAIMABLE: [DeliveryStatus; 2] = [DeliveryStatus::Pending, DeliveryStatus::Scheduled];

    pub fn is_terminal(self) -> bool {
        self == DeliveryStatus::Sent
    }

    /// Whether `self -> next` is an edge of the delivery state machine.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Scheduled, Processing)
                | (Pending, Processing)
                | (Processing, Sent)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Scheduled => write!(f, "SCHEDULED"),
            DeliveryStatus::Pending => write!(f, "PENDING"),
            DeliveryStatus::Processing => write!(f, "PROCESSING"),
            DeliveryStatus::Sent => write!(f, "SENT"),
            DeliveryStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ============================================================================
// MessageDelivery
// ============================================================================

/// One (message, integration, conversation) send attempt record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivery {
    pub id: Uuid,
    pub message_id: Uuid,
    pub integration_id: Uuid,
    pub selected_conversation_id: Uuid,
    pub status: DeliveryStatus,
    pub sent_at: Option<Timestamp>,
    /// Platform-assigned message id on success.
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub last_retry_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MessageDelivery {
    /// Uniqueness key of a delivery.
    pub fn target_key(&self) -> (Uuid, Uuid, Uuid) {
        (
            self.message_id,
            self.integration_id,
            self.selected_conversation_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub message_id: Uuid,
    pub integration_id: Uuid,
    pub selected_conversation_id: Uuid,
    pub status: DeliveryStatus,
}

impl NewDelivery {
    pub fn target_key(&self) -> (Uuid, Uuid, Uuid) {
        (
            self.message_id,
            self.integration_id,
            self.selected_conversation_id,
        )
    }
}

// ============================================================================
// Conditional updates
// ============================================================================

/// How a patch touches `retry_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryUpdate {
    #[default]
    Keep,
    Reset,
    Increment,
}

/// Field changes applied by a guarded status update.
///
/// `None` leaves a column untouched; `error_message: Some(None)` clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPatch {
    pub status: DeliveryStatus,
    pub sent_at: Option<Timestamp>,
    pub external_id: Option<String>,
    pub error_message: Option<Option<String>>,
    pub retry: RetryUpdate,
    pub last_retry_at: Option<Timestamp>,
}

impl DeliveryPatch {
    fn to_status(status: DeliveryStatus) -> Self {
        Self {
            status,
            sent_at: None,
            external_id: None,
            error_message: None,
            retry: RetryUpdate::Keep,
            last_retry_at: None,
        }
    }

    /// `Pending | Scheduled -> Processing`.
    pub fn claim() -> Self {
        Self::to_status(DeliveryStatus::Processing)
    }

    /// `Failed -> Processing`, stamping the retry time.
    pub fn rearm(now: Timestamp) -> Self {
        Self {
            last_retry_at: Some(now),
            ..Self::to_status(DeliveryStatus::Processing)
        }
    }

    pub fn sent(external_id: Option<String>, now: Timestamp) -> Self {
        Self {
            sent_at: Some(now),
            external_id,
            error_message: Some(None),
            retry: RetryUpdate::Reset,
            ..Self::to_status(DeliveryStatus::Sent)
        }
    }

    pub fn failed(error: impl Into<String>, now: Timestamp) -> Self {
        Self {
            error_message: Some(Some(error.into())),
            retry: RetryUpdate::Increment,
            last_retry_at: Some(now),
            ..Self::to_status(DeliveryStatus::Failed)
        }
    }

    /// Rejects a guard whose expected statuses cannot legally reach `self.status`.
    pub fn check_transition(&self, expected: &[DeliveryStatus]) -> AppResult<()> {
        if expected.is_empty() {
            return Err(AppError::Validation {
                field: "status".to_string(),
                reason: "at least one expected status is required".to_string(),
            });
        }
        match expected
            .iter()
            .find(|from| !from.can_transition_to(self.status))
        {
            Some(from) => Err(AppError::Validation {
                field: "status".to_string(),
                reason: format!("illegal transition {} -> {}", from, self.status),
            }),
            None => Ok(()),
        }
    }

    /// Applies the patch to an in-memory row.
    pub fn apply(&self, delivery: &mut MessageDelivery, now: Timestamp) {
        delivery.status = self.status;
        if let Some(sent_at) = self.sent_at {
            delivery.sent_at = Some(sent_at);
        }
        if let Some(external_id) = &self.external_id {
            delivery.external_id = Some(external_id.clone());
        }
        if let Some(error_message) = &self.error_message {
            delivery.error_message = error_message.clone();
        }
        match self.retry {
            RetryUpdate::Keep => {}
            RetryUpdate::Reset => delivery.retry_count = 0,
            RetryUpdate::Increment => delivery.retry_count += 1,
        }
        if let Some(last_retry_at) = self.last_retry_at {
            delivery.last_retry_at = Some(last_retry_at);
        }
        delivery.updated_at = now;
    }
}

/// Extra predicates for `find_deliveries_by_status`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryFilter {
    /// Only rows with `retry_count` strictly below this value.
    pub retry_count_below: Option<i32>,
    /// Only rows whose `last_retry_at` is null or strictly earlier.
    pub last_retry_before: Option<Timestamp>,
}

impl DeliveryFilter {
    pub fn matches(&self, delivery: &MessageDelivery) -> bool {
        if let Some(limit) = self.retry_count_below
            && delivery.retry_count >= limit
        {
            return false;
        }
        if let (Some(cutoff), Some(last)) = (self.last_retry_before, delivery.last_retry_at)
            && last >= cutoff
        {
            return false;
        }
        true
    }
}

// ============================================================================
// Views
// ============================================================================

/// Integration with the active conversations a message fans out to.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTarget {
    pub integration: Integration,
    pub conversations: Vec<SelectedConversation>,
}

/// Everything needed to send one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryContext {
    pub delivery: MessageDelivery,
    pub content: String,
    pub platform: PlatformKind,
    pub integration_config: JsonValue,
    pub conversation_external_id: String,
}

/// Delivery count of one integration across a user's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationDeliveryCount {
    pub integration_id: Uuid,
    pub name: String,
    pub platform: PlatformKind,
    pub deliveries: i64,
}

/// Payload stored in the scheduled work index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub message_id: Uuid,
    pub delivery_id: Uuid,
}

impl ScheduledJob {
    pub fn to_member(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_member(member: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(member)
    }
}
