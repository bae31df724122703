//! Integration and conversation models.
//!
//! An integration is a user's connection to one external platform; its
//! selected conversations are the chats a message can be fanned out to.

use diesel_derive_enum::DbEnum;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

/// External platform an integration talks to.
///
/// Fixed when the integration is created and used to pick the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::PlatformKind")]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Telegram,
    Whatsapp,
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformKind::Telegram => write!(f, "telegram"),
            PlatformKind::Whatsapp => write!(f, "whatsapp"),
        }
    }
}

/// Connection state of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::IntegrationStatus")]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Expired,
}

// ============================================================================
// Integration / SelectedConversation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub platform: PlatformKind,
    pub status: IntegrationStatus,
    pub config: JsonValue,
}

impl Integration {
    /// Only connected integrations take part in fan-out.
    pub fn is_connected(&self) -> bool {
        self.status == IntegrationStatus::Connected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedConversation {
    pub id: Uuid,
    pub integration_id: Uuid,
    /// Chat id or phone number on the external platform.
    pub external_id: String,
    pub name: String,
    pub conversation_type: String,
    pub active: bool,
    pub created_at: Timestamp,
}

// ============================================================================
// Config Type-Safe Helpers
// ============================================================================

/// Telegram bot configuration stored in `integrations.config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    pub bot_token: String,
}

/// Evolution API (WhatsApp) configuration stored in `integrations.config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionConfig {
    pub instance_name: String,
}

impl TelegramConfig {
    /// Parse JSONB config into typed TelegramConfig
    pub fn from_json(config: &JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(config.clone())
    }
}

impl EvolutionConfig {
    /// Parse JSONB config into typed EvolutionConfig
    pub fn from_json(config: &JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(config.clone())
    }
}
