//! Errors raised while loading or validating `Settings`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required TOML layer is absent.
    #[error("configuration file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    /// The merged sources do not form valid settings.
    #[error("unreadable configuration: {0}")]
    Parse(String),

    /// A setting holds a value the scheduler cannot run with.
    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: String, message: String },

    #[error(
        "unknown environment '{0}', expected one of: development, test, staging, production"
    )]
    UnknownEnvironment(String),

    /// `COURIER_CONFIG_DIR` and `COURIER_CONFIG_FILE` are both set.
    #[error(
        "COURIER_CONFIG_DIR and COURIER_CONFIG_FILE cannot both be set; \
         use the directory for layered settings or the file for a single one"
    )]
    ConflictingSources,

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Dotted settings path at fault, when one is known.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}
