mod app_error;
mod database_converter;

pub use app_error::{AppError, AppResult};
pub use database_converter::{DELIVERY_TARGET_CONSTRAINT, DatabaseErrorConverter};
