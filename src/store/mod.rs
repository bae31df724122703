//! Delivery record store.
//!
//! `DeliveryStore` is implemented by `MemoryDeliveryStore` here and by
//! `repositories::PgDeliveryStore` for PostgreSQL.

mod memory;
mod traits;

pub use memory::MemoryDeliveryStore;
pub use traits::DeliveryStore;
