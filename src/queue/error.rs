//! Coordination backend error types.

use thiserror::Error;

/// Errors raised by the work index and lock manager backends.
///
/// Losing a claim or failing to acquire a lock is not an error; both are
/// reported through ordinary return values.
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Coordination operation failed: {0}")]
    Operation(String),

    #[error("Coordination backend connection failed: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}
