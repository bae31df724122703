use crate::error::DatabaseErrorConverter;
use crate::queue::CoordinationError;
use thiserror::Error;

/// Application-wide error type that represents all possible errors in the system.
///
/// Send failures of individual deliveries are never surfaced through this type;
/// they are recorded on the delivery row instead. `AppError` covers the
/// infrastructure around them: storage, coordination backends, configuration
/// and request validation.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error with entity, field, and value information
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Duplicate entry error for unique constraint violations
    #[error("Duplicate entry: {entity}.{field} = '{value}' already exists")]
    Duplicate {
        entity: String,
        field: String,
        value: String,
    },

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Bad request error with descriptive message
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// Lock manager or work index backend failure
    #[error("Coordination backend error")]
    Coordination {
        #[from]
        source: CoordinationError,
    },

    /// Transport or protocol failure talking to an external messaging platform
    #[error("{platform} API error: {message}")]
    ExternalApi {
        platform: String,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Shorthand for a `NotFound` error keyed by id.
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity: entity.to_string(),
            field: "id".to_string(),
            value: id.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, reason) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "invalid value".to_string());
                (field.to_string(), reason)
            })
            .unwrap_or_else(|| ("request".to_string(), errors.to_string()));
        AppError::Validation { field, reason }
    }
}

impl From<crate::config::error::ConfigError> for AppError {
    fn from(error: crate::config::error::ConfigError) -> Self {
        AppError::Configuration {
            key: error.field().unwrap_or("settings").to_string(),
            source: anyhow::Error::from(error),
        }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = AppError::not_found("message_delivery", "abc");
        assert_eq!(
            err.to_string(),
            "Resource not found: message_delivery with id=abc"
        );
    }

    #[test]
    fn test_coordination_error_conversion() {
        let err: AppError = CoordinationError::Operation("boom".to_string()).into();
        assert!(matches!(err, AppError::Coordination { .. }));
    }

    #[test]
    fn test_diesel_not_found_conversion() {
        let err: AppError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn test_config_error_keeps_field_as_key() {
        let err = AppError::from(crate::config::ConfigError::invalid(
            "redis.url",
            "Redis URL must not be empty.",
        ));
        assert!(matches!(err, AppError::Configuration { ref key, .. } if key == "redis.url"));

        let err = AppError::from(crate::config::ConfigError::ConflictingSources);
        assert!(matches!(err, AppError::Configuration { ref key, .. } if key == "settings"));
    }
}
