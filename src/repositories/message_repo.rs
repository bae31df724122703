//! Message repository for async database operations.
//!
//! Provides operations for the messages table.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageCounts, NewMessage};
use crate::repositories::rows::{MessageRow, NewMessageRow};

/// Message repository holding an async connection pool.
#[derive(Clone)]
pub struct MessageRepository {
    pool: AsyncDbPool,
}

impl MessageRepository {
    /// Creates a new MessageRepository with the given connection pool.
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    /// Creates a new message
    ///
    /// # Arguments
    /// * `new_message` - The message data to insert
    ///
    /// # Returns
    /// The created message with generated id and timestamp
    pub async fn create(&self, new_message: NewMessage) -> AppResult<Message> {
        use crate::schema::messages::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        diesel::insert_into(messages)
            .values(NewMessageRow::from(new_message))
            .returning(MessageRow::as_returning())
            .get_result(&mut conn)
            .await
            .map(Message::from)
            .map_err(AppError::from)
    }

    /// Finds a message by its ID.
    ///
    /// # Returns
    /// `Some(Message)` if found, `None` otherwise
    pub async fn find_by_id(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        use crate::schema::messages::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        messages
            .filter(id.eq(message_id))
            .select(MessageRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|row| row.map(Message::from))
            .map_err(AppError::from)
    }

    /// Sets `sent_at` when it is still null.
    ///
    /// # Returns
    /// `true` if this call wrote the timestamp
    pub async fn set_sent_at_if_null(&self, message_id: Uuid, at: Timestamp) -> AppResult<bool> {
        use crate::schema::messages::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let affected = diesel::update(messages.filter(id.eq(message_id)).filter(sent_at.is_null()))
            .set(sent_at.eq(Some(at.to_diesel())))
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(affected == 1)
    }

    /// Counts a user's messages: all, still-future scheduled, and sent.
    pub async fn count_for_user(&self, uid: Uuid, now: Timestamp) -> AppResult<MessageCounts> {
        use crate::schema::messages::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let total: i64 = messages
            .filter(user_id.eq(uid))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)?;

        let scheduled: i64 = messages
            .filter(user_id.eq(uid))
            .filter(is_scheduled.eq(true))
            .filter(scheduled_for.gt(now.to_diesel()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)?;

        let sent: i64 = messages
            .filter(user_id.eq(uid))
            .filter(sent_at.is_not_null())
            .count()
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(MessageCounts {
            total,
            scheduled,
            sent,
        })
    }
}
