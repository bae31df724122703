use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-authored message, fanned out to one delivery per target conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub is_scheduled: bool,
    pub scheduled_for: Option<Timestamp>,
    /// First successful delivery time. Written once.
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Message {
    /// Due time in epoch milliseconds for deferred messages.
    pub fn due_at_millis(&self) -> Option<i64> {
        self.scheduled_for.map(|at| at.as_millisecond())
    }
}

/// Insert model for a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: Uuid,
    pub content: String,
    pub scheduled_for: Option<Timestamp>,
}

impl NewMessage {
    pub fn is_scheduled(&self) -> bool {
        self.scheduled_for.is_some()
    }
}

/// Message totals for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCounts {
    pub total: i64,
    /// Deferred messages whose time has not come yet.
    pub scheduled: i64,
    /// Messages with at least one successful delivery.
    pub sent: i64,
}
