use crate::error::AppError;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// Unique index guarding one delivery per (message, integration, conversation).
pub const DELIVERY_TARGET_CONSTRAINT: &str = "message_deliveries_target_key";

/// Utility for converting database errors to structured AppError variants.
///
/// PostgreSQL reports table, column and constraint names alongside the error,
/// so the structured variants are built from those fields rather than from
/// the human readable message.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    ///
    /// # Arguments
    /// * `error` - The Diesel error to convert
    /// * `operation` - Description of the database operation that failed
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info.as_ref(), operation)
            }
            DieselError::NotFound => AppError::NotFound {
                entity: "resource".to_string(),
                field: "id".to_string(),
                value: "unknown".to_string(),
            },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: &(dyn DatabaseErrorInformation + Send + Sync),
        operation: &str,
    ) -> AppError {
        let entity = info.table_name().unwrap_or("resource").to_string();

        match kind {
            DatabaseErrorKind::UniqueViolation => {
                if info.constraint_name() == Some(DELIVERY_TARGET_CONSTRAINT) {
                    return AppError::Duplicate {
                        entity: "message_delivery".to_string(),
                        field: "message_id,integration_id,selected_conversation_id".to_string(),
                        value: info.details().unwrap_or_default().to_string(),
                    };
                }
                AppError::Duplicate {
                    entity,
                    field: Self::field_name(info),
                    value: info.details().unwrap_or_default().to_string(),
                }
            }
            DatabaseErrorKind::NotNullViolation => AppError::Validation {
                field: Self::field_name(info),
                reason: format!("Field is required for {}", entity),
            },
            DatabaseErrorKind::ForeignKeyViolation => AppError::Validation {
                field: Self::field_name(info),
                reason: format!(
                    "Invalid reference from {}: {}",
                    entity,
                    info.details().unwrap_or(info.message())
                ),
            },
            DatabaseErrorKind::CheckViolation => AppError::Validation {
                field: Self::field_name(info),
                reason: format!("Check constraint failed for {}", entity),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Database error: {}", info.message())),
            },
        }
    }

    fn field_name(info: &(dyn DatabaseErrorInformation + Send + Sync)) -> String {
        info.column_name()
            .or(info.constraint_name())
            .unwrap_or("unknown")
            .to_string()
    }
}
