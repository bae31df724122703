//! Delivery repository for async database operations.
//!
//! Provides operations for the message_deliveries table, including the
//! status-guarded update every state transition goes through.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    DeliveryFilter, DeliveryPatch, DeliveryStatus, IntegrationDeliveryCount, MessageDelivery,
    NewDelivery, PlatformKind, RetryUpdate,
};
use crate::repositories::rows::{DeliveryChangeset, DeliveryRow, NewDeliveryRow};

/// Delivery repository
#[derive(Clone)]
pub struct DeliveryRepository {
    pool: AsyncDbPool,
}

impl DeliveryRepository {
    /// Creates a new DeliveryRepository with the given connection pool.
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    /// Inserts a batch of deliveries in one statement.
    ///
    /// A unique violation on the target triple fails the whole batch.
    pub async fn create_batch(&self, new_deliveries: Vec<NewDelivery>) -> AppResult<Vec<MessageDelivery>> {
        use crate::schema::message_deliveries::dsl::*;
        if new_deliveries.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let rows: Vec<NewDeliveryRow> = new_deliveries.into_iter().map(NewDeliveryRow::from).collect();
        diesel::insert_into(message_deliveries)
            .values(&rows)
            .returning(DeliveryRow::as_returning())
            .get_results(&mut conn)
            .await
            .map(|rows: Vec<DeliveryRow>| rows.into_iter().map(MessageDelivery::from).collect())
            .map_err(AppError::from)
    }

    /// Applies `patch` only while the row's status is in `expected`.
    ///
    /// # Returns
    /// Number of rows affected (0 or 1)
    pub async fn update_if_status(
        &self,
        delivery_id: Uuid,
        expected: &[DeliveryStatus],
        patch: &DeliveryPatch,
    ) -> AppResult<usize> {
        use crate::schema::message_deliveries::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let changeset = DeliveryChangeset::from_patch(patch, Timestamp::now());
        let target = message_deliveries
            .filter(id.eq(delivery_id))
            .filter(status.eq_any(expected.to_vec()));

        let result = match patch.retry {
            RetryUpdate::Keep => diesel::update(target).set(&changeset).execute(&mut conn).await,
            RetryUpdate::Reset => {
                diesel::update(target)
                    .set((&changeset, retry_count.eq(0)))
                    .execute(&mut conn)
                    .await
            }
            RetryUpdate::Increment => {
                diesel::update(target)
                    .set((&changeset, retry_count.eq(retry_count + 1)))
                    .execute(&mut conn)
                    .await
            }
        };

        result.map_err(AppError::from)
    }

    /// Finds deliveries in `status_filter` matching `filter`, oldest first.
    pub async fn find_by_status(
        &self,
        status_filter: DeliveryStatus,
        filter: &DeliveryFilter,
        max_rows: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        use crate::schema::message_deliveries::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let mut query = message_deliveries
            .filter(status.eq(status_filter))
            .into_boxed();

        if let Some(below) = filter.retry_count_below {
            query = query.filter(retry_count.lt(below));
        }
        if let Some(cutoff) = filter.last_retry_before {
            query = query.filter(
                last_retry_at
                    .is_null()
                    .or(last_retry_at.lt(cutoff.to_diesel())),
            );
        }

        query
            .order((created_at.asc(), id.asc()))
            .limit(max_rows)
            .select(DeliveryRow::as_select())
            .load(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(MessageDelivery::from).collect())
            .map_err(AppError::from)
    }

    /// Finds `Scheduled` deliveries of messages due at or before `due_before`.
    pub async fn find_overdue_scheduled(
        &self,
        due_before: Timestamp,
        max_rows: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        use crate::schema::{message_deliveries, messages};
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        message_deliveries::table
            .inner_join(messages::table)
            .filter(message_deliveries::status.eq(DeliveryStatus::Scheduled))
            .filter(messages::scheduled_for.le(due_before.to_diesel()))
            .order((
                messages::scheduled_for.asc(),
                message_deliveries::created_at.asc(),
                message_deliveries::id.asc(),
            ))
            .limit(max_rows)
            .select(DeliveryRow::as_select())
            .load(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(MessageDelivery::from).collect())
            .map_err(AppError::from)
    }

    /// Finds a delivery by its ID.
    pub async fn find_by_id(&self, delivery_id: Uuid) -> AppResult<Option<MessageDelivery>> {
        use crate::schema::message_deliveries::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        message_deliveries
            .filter(id.eq(delivery_id))
            .select(DeliveryRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|row| row.map(MessageDelivery::from))
            .map_err(AppError::from)
    }

    /// Lists every delivery of one message.
    pub async fn find_by_message_id(&self, mid: Uuid) -> AppResult<Vec<MessageDelivery>> {
        use crate::schema::message_deliveries::dsl::*;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        message_deliveries
            .filter(message_id.eq(mid))
            .order((created_at.asc(), id.asc()))
            .select(DeliveryRow::as_select())
            .load(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(MessageDelivery::from).collect())
            .map_err(AppError::from)
    }

    /// Counts a user's deliveries grouped by status.
    pub async fn count_by_status_for_user(&self, uid: Uuid) -> AppResult<Vec<(DeliveryStatus, i64)>> {
        use crate::schema::{message_deliveries, messages};
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        message_deliveries::table
            .inner_join(messages::table)
            .filter(messages::user_id.eq(uid))
            .group_by(message_deliveries::status)
            .select((message_deliveries::status, diesel::dsl::count_star()))
            .load::<(DeliveryStatus, i64)>(&mut conn)
            .await
            .map_err(AppError::from)
    }

    /// Counts a user's deliveries grouped by integration.
    pub async fn count_by_integration_for_user(
        &self,
        uid: Uuid,
    ) -> AppResult<Vec<IntegrationDeliveryCount>> {
        use crate::schema::{integrations, message_deliveries, messages};
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        message_deliveries::table
            .inner_join(messages::table)
            .inner_join(integrations::table)
            .filter(messages::user_id.eq(uid))
            .group_by((integrations::id, integrations::name, integrations::platform))
            .order(integrations::id.asc())
            .select((
                integrations::id,
                integrations::name,
                integrations::platform,
                diesel::dsl::count_star(),
            ))
            .load::<(Uuid, String, PlatformKind, i64)>(&mut conn)
            .await
            .map(|rows| {
                rows.into_iter()
                    .map(|(integration_id, name, platform, deliveries)| IntegrationDeliveryCount {
                        integration_id,
                        name,
                        platform,
                        deliveries,
                    })
                    .collect()
            })
            .map_err(AppError::from)
    }
}
