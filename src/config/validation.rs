//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use crate::config::error::ConfigError;
use crate::config::settings::{
    DatabaseConfig, FileSettings, LoggerSettings, PlatformsConfig, RedisConfig, SchedulerBackend,
    SchedulerConfig, Settings,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must not be empty
    /// - URL must be a PostgreSQL connection string
    /// - Max connections must be greater than 0
    /// - Min connections must be greater than 0
    /// - Min connections must not exceed max connections
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::invalid(
                "database.url",
                "Database URL is required. Please specify a valid database connection string.",
            ));
        }

        if !self.is_valid_database_url() {
            return Err(ConfigError::invalid(
                "database.url",
                "Invalid database URL format. Expected format: postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::invalid(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::invalid(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::Invalid {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }

    fn is_valid_database_url(&self) -> bool {
        ["postgres://", "postgresql://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

impl RedisConfig {
    /// Validate redis configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("redis://")
            || self.url.starts_with("rediss://")
            || self.url.starts_with("redis+unix://"))
        {
            return Err(ConfigError::invalid(
                "redis.url",
                "Invalid redis URL. Expected format: redis://[user:password@]host[:port][/db]",
            ));
        }

        if self.pool_size == 0 {
            return Err(ConfigError::invalid(
                "redis.pool_size",
                "Pool size must be greater than 0.",
            ));
        }

        if self.connection_timeout == 0 {
            return Err(ConfigError::invalid(
                "redis.connection_timeout",
                "Connection timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration
    ///
    /// # Validation Rules
    /// - Queue key must not be empty
    /// - All intervals, TTLs and batch sizes must be greater than 0
    /// - Max retries must not be negative
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_key.trim().is_empty() {
            return Err(ConfigError::invalid(
                "scheduler.queue_key",
                "Queue key must not be empty.",
            ));
        }

        let positive = [
            ("scheduler.tick_interval_secs", self.tick_interval_secs),
            ("scheduler.batch_limit", self.batch_limit as u64),
            ("scheduler.job_lock_ttl_secs", self.job_lock_ttl_secs),
            ("scheduler.global_lock_ttl_secs", self.global_lock_ttl_secs),
            ("scheduler.retry_interval_secs", self.retry_interval_secs),
            ("scheduler.overdue_grace_secs", self.overdue_grace_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    message: "Value must be greater than 0.".to_string(),
                });
            }
        }

        if self.retry_batch_size <= 0 {
            return Err(ConfigError::invalid(
                "scheduler.retry_batch_size",
                "Retry batch size must be greater than 0.",
            ));
        }

        if self.max_retries < 0 {
            return Err(ConfigError::invalid(
                "scheduler.max_retries",
                "Max retries must not be negative.",
            ));
        }

        Ok(())
    }
}

impl PlatformsConfig {
    /// Validate platform configuration
    ///
    /// Evolution credentials may be absent; WhatsApp sends then fail per delivery.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.telegram.api_base.starts_with("http://")
            && !self.telegram.api_base.starts_with("https://")
        {
            return Err(ConfigError::invalid(
                "platforms.telegram.api_base",
                "Telegram API base must be an http(s) URL.",
            ));
        }

        let api_url = &self.evolution.api_url;
        if !api_url.is_empty() && !api_url.starts_with("http://") && !api_url.starts_with("https://")
        {
            return Err(ConfigError::invalid(
                "platforms.evolution.api_url",
                "Evolution API URL must be an http(s) URL.",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "platforms.request_timeout_secs",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::invalid(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// # Validation Rules
    /// - Log level must be one of: trace, debug, info, warn, error,
    ///   or a filter directive such as `courier_rs=debug`
    /// - If file logging is enabled, path must not be empty
    /// - Log format must be one of: full, compact, json
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.to_lowercase();
        let first = level.split(',').next().unwrap_or_default().trim();
        if !VALID_LOG_LEVELS.contains(&first) && !first.contains('=') {
            return Err(ConfigError::Invalid {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        self.file.validate()?;

        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// Returns the first validation error encountered. Redis settings are only
    /// checked when the scheduler uses the redis backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        if self.scheduler.backend == SchedulerBackend::Redis {
            self.redis.validate()?;
        }
        self.scheduler.validate()?;
        self.platforms.validate()?;
        self.logger.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        Settings {
            database: DatabaseConfig {
                url: "postgres://localhost/courier".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    // ========================================================================
    // DatabaseConfig validation tests
    // ========================================================================

    #[test]
    fn test_database_config_empty_url() {
        let err = DatabaseConfig::default().validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == "database.url")
        );
    }

    #[test]
    fn test_database_config_rejects_non_postgres() {
        let config = DatabaseConfig {
            url: "mysql://localhost/db".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_min_exceeds_max() {
        let config = DatabaseConfig {
            url: "postgresql://localhost/db".to_string(),
            max_connections: 2,
            min_connections: 5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == "database.min_connections")
        );
    }

    // ========================================================================
    // Redis / Scheduler / Platforms
    // ========================================================================

    #[test]
    fn test_redis_config_invalid_url() {
        let config = RedisConfig {
            url: "http://localhost".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "redis.url"));
    }

    #[test]
    fn test_redis_ignored_for_memory_backend() {
        let mut settings = valid_settings();
        settings.redis.url = "bogus".to_string();
        assert!(settings.validate().is_err());

        settings.scheduler.backend = SchedulerBackend::Memory;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_scheduler_config_zero_tick_interval() {
        let config = SchedulerConfig {
            tick_interval_secs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == "scheduler.tick_interval_secs")
        );
    }

    #[test]
    fn test_scheduler_config_negative_retries() {
        let config = SchedulerConfig {
            max_retries: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_platforms_config_bad_evolution_url() {
        let mut config = PlatformsConfig::default();
        assert!(config.validate().is_ok());
        config.evolution.api_url = "evolution.local".to_string();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == "platforms.evolution.api_url")
        );
    }

    // ========================================================================
    // LoggerSettings validation tests
    // ========================================================================

    #[test]
    fn test_logger_settings_levels() {
        for level in ["TRACE", "debug", "info", "warn", "error", "courier_rs=debug,info"] {
            let settings = LoggerSettings {
                level: level.to_string(),
                ..Default::default()
            };
            assert!(settings.validate().is_ok(), "level {level} should be valid");
        }

        let settings = LoggerSettings {
            level: "verbose".to_string(),
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == "logger.level")
        );
    }

    #[test]
    fn test_logger_settings_file_path_required() {
        let settings = LoggerSettings {
            file: FileSettings {
                enabled: true,
                path: "  ".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == "logger.file.path")
        );
    }

    #[test]
    fn test_settings_valid() {
        assert!(valid_settings().validate().is_ok());
    }
}
