//! External messaging platforms.
//!
//! Each integration is sent through the adapter registered for its
//! `PlatformKind`; the stored config JSON only supplies credentials.

mod adapter;
mod http;
mod registry;
mod telegram;
mod whatsapp;

pub use adapter::{PlatformAdapter, SendOutcome};
pub use http::build_http_client;
pub use registry::{AdapterFactory, AdapterRegistry};
pub use telegram::TelegramAdapter;
pub use whatsapp::EvolutionAdapter;
