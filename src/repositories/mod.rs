//! Repository layer for data access operations.
//!
//! Provides async PostgreSQL access for messages, deliveries and
//! integrations, and `PgDeliveryStore` on top of them.

mod delivery_repo;
mod integration_repo;
mod message_repo;
mod pg_store;
mod rows;

pub use delivery_repo::DeliveryRepository;
pub use integration_repo::IntegrationRepository;
pub use message_repo::MessageRepository;
pub use pg_store::PgDeliveryStore;

use crate::db::AsyncDbPool;

/// Aggregates all repositories for convenient access.
///
/// Since `AsyncDbPool` uses `Arc` internally, cloning is cheap.
#[derive(Clone)]
pub struct Repositories {
    pub messages: MessageRepository,
    pub deliveries: DeliveryRepository,
    pub integrations: IntegrationRepository,
}

impl Repositories {
    /// Creates a new Repositories instance with all repositories initialized.
    ///
    /// # Arguments
    /// * `pool` - The async database connection pool
    pub fn new(pool: AsyncDbPool) -> Self {
        Self {
            messages: MessageRepository::new(pool.clone()),
            deliveries: DeliveryRepository::new(pool.clone()),
            integrations: IntegrationRepository::new(pool),
        }
    }
}
