//! Integration repository for async database operations.
//!
//! Reads integrations and their selected conversations for fan-out and
//! assembles the joined view needed to send one delivery.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    DeliveryContext, DispatchTarget, Integration, IntegrationStatus, MessageDelivery, PlatformKind,
    SelectedConversation,
};
use crate::repositories::rows::{ConversationRow, DeliveryRow, IntegrationRow};

/// Integration repository
#[derive(Clone)]
pub struct IntegrationRepository {
    pool: AsyncDbPool,
}

impl IntegrationRepository {
    /// Creates a new IntegrationRepository with the given connection pool.
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    /// Finds connected integrations of a user with their active conversations.
    ///
    /// # Arguments
    /// * `uid` - Owner of the integrations
    /// * `only` - Optional subset of integration ids
    pub async fn find_dispatch_targets(
        &self,
        uid: Uuid,
        only: Option<&[Uuid]>,
    ) -> AppResult<Vec<DispatchTarget>> {
        use crate::schema::{integrations, selected_conversations};
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let mut query = integrations::table
            .filter(integrations::user_id.eq(uid))
            .filter(integrations::status.eq(IntegrationStatus::Connected))
            .into_boxed();
        if let Some(ids) = only {
            query = query.filter(integrations::id.eq_any(ids.to_vec()));
        }

        let found: Vec<Integration> = query
            .order(integrations::id.asc())
            .select(IntegrationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .map(Integration::from)
            .collect();

        if found.is_empty() {
            return Ok(Vec::new());
        }

        let integration_ids: Vec<Uuid> = found.iter().map(|i| i.id).collect();
        let conversations: Vec<SelectedConversation> = selected_conversations::table
            .filter(selected_conversations::integration_id.eq_any(integration_ids))
            .filter(selected_conversations::active.eq(true))
            .order((
                selected_conversations::created_at.asc(),
                selected_conversations::id.asc(),
            ))
            .select(ConversationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .map(SelectedConversation::from)
            .collect();

        let mut by_integration: HashMap<Uuid, Vec<SelectedConversation>> = HashMap::new();
        for conversation in conversations {
            by_integration
                .entry(conversation.integration_id)
                .or_default()
                .push(conversation);
        }

        Ok(found
            .into_iter()
            .map(|integration| DispatchTarget {
                conversations: by_integration.remove(&integration.id).unwrap_or_default(),
                integration,
            })
            .collect())
    }

    /// Loads a delivery joined with its message, integration and conversation.
    ///
    /// # Returns
    /// `Some(DeliveryContext)` if the delivery exists, `None` otherwise
    pub async fn find_delivery_context(&self, delivery_id: Uuid) -> AppResult<Option<DeliveryContext>> {
        use crate::schema::{integrations, message_deliveries, messages, selected_conversations};
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let row = message_deliveries::table
            .inner_join(messages::table)
            .inner_join(integrations::table)
            .inner_join(selected_conversations::table)
            .filter(message_deliveries::id.eq(delivery_id))
            .select((
                DeliveryRow::as_select(),
                messages::content,
                integrations::platform,
                integrations::config,
                selected_conversations::external_id,
            ))
            .first::<(DeliveryRow, String, PlatformKind, JsonValue, String)>(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(row.map(
            |(delivery, content, platform, integration_config, conversation_external_id)| {
                DeliveryContext {
                    delivery: MessageDelivery::from(delivery),
                    content,
                    platform,
                    integration_config,
                    conversation_external_id,
                }
            },
        ))
    }
}
