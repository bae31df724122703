//! Command handlers for CLI operations
//!
//! Separates command execution logic from parsing and validation.

pub mod migrate;
pub mod run_once;
pub mod serve;

pub use migrate::MigrateCommandHandler;
pub use run_once::RunOnceCommandHandler;
pub use serve::ServeCommandHandler;
