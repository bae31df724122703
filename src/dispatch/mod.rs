//! Delivery dispatch: fan-out, scheduled ticks and retries.
//!
//! - `FanoutEngine` creates deliveries and runs the single-delivery send path
//! - `DeliveryScheduler` claims due jobs each tick under per-job locks
//! - `RetrySweeper` re-arms failed deliveries after a cool-down
//!
//! Every status change is a guarded update on the store, so any number of
//! instances can run these loops against the same backends.

mod engine;
mod periodic;
mod scheduler;
mod sweeper;

#[cfg(test)]
mod tests;

pub use engine::{FanoutEngine, FanoutReport, SendDisposition};
pub use periodic::spawn_periodic;
pub use scheduler::{DeliveryScheduler, TickReport};
pub use sweeper::{RetrySweeper, SweepReport};
