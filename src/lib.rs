//! courier-rs library
//!
//! Distributed delivery scheduler fanning user messages out to chat
//! platform conversations.

use shadow_rs::shadow;
shadow!(build);

pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod logger;
pub mod models;
pub mod platforms;
pub mod queue;
pub mod repositories;
pub mod schema;
pub mod server;
pub mod services;
pub mod state;
pub mod store;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
