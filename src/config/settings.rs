//! Configuration settings structures for courier-rs
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "courier-rs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/courier.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> u32 {
    8
}

fn default_redis_connection_timeout() -> u64 {
    5
}

fn default_redis_key_prefix() -> String {
    "courier".to_string()
}

fn default_queue_key() -> String {
    "scheduled_messages".to_string()
}

fn default_tick_interval() -> u64 {
    30
}

fn default_batch_limit() -> usize {
    10
}

fn default_job_lock_ttl() -> u64 {
    300
}

fn default_global_lock_ttl() -> u64 {
    30
}

fn default_retry_interval() -> u64 {
    60
}

fn default_max_retries() -> i32 {
    3
}

fn default_retry_cooldown() -> u64 {
    300
}

fn default_retry_batch_size() -> i64 {
    10
}

fn default_overdue_grace() -> u64 {
    300
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_platform_request_timeout() -> u64 {
    30
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Diesel database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Whether to automatically run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

// ============================================================================
// Redis Configuration
// ============================================================================

/// Redis connection configuration shared by the work index and lock manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_redis_connection_timeout")]
    pub connection_timeout: u64,

    /// Prefix joined to every key with `:`
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            connection_timeout: default_redis_connection_timeout(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Backend holding the work index and locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerBackend {
    #[default]
    Redis,
    Memory,
}

/// How due jobs are claimed from the work index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStrategy {
    /// Backend-native range-and-remove
    #[default]
    Atomic,
    /// Peek and remove under the global processing lock
    LockGuarded,
}

/// Delivery scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether `serve` starts the tick and retry loops
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: SchedulerBackend,

    #[serde(default)]
    pub claim_strategy: ClaimStrategy,

    /// Sorted set key of scheduled jobs (before prefixing)
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Jobs claimed per tick
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// TTL of the per-job processing lock in seconds
    #[serde(default = "default_job_lock_ttl")]
    pub job_lock_ttl_secs: u64,

    /// TTL of the global claim lock in seconds
    #[serde(default = "default_global_lock_ttl")]
    pub global_lock_ttl_secs: u64,

    /// Seconds between retry sweeps
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Deliveries with this many failures are never retried
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    /// Minimum seconds between two attempts of one delivery
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,

    /// Deliveries re-armed per sweep
    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: i64,

    /// Scheduled deliveries this many seconds past due are sent by the tick
    /// even without a job in the work index
    #[serde(default = "default_overdue_grace")]
    pub overdue_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: SchedulerBackend::default(),
            claim_strategy: ClaimStrategy::default(),
            queue_key: default_queue_key(),
            tick_interval_secs: default_tick_interval(),
            batch_limit: default_batch_limit(),
            job_lock_ttl_secs: default_job_lock_ttl(),
            global_lock_ttl_secs: default_global_lock_ttl(),
            retry_interval_secs: default_retry_interval(),
            max_retries: default_max_retries(),
            retry_cooldown_secs: default_retry_cooldown(),
            retry_batch_size: default_retry_batch_size(),
            overdue_grace_secs: default_overdue_grace(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn job_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.job_lock_ttl_secs)
    }

    pub fn global_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.global_lock_ttl_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }

    pub fn overdue_grace(&self) -> Duration {
        Duration::from_secs(self.overdue_grace_secs)
    }
}

// ============================================================================
// Platform Configuration
// ============================================================================

/// Telegram Bot API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramPlatformConfig {
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramPlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
        }
    }
}

/// Evolution API (WhatsApp) settings
///
/// Both values are required to send through WhatsApp integrations; sends fail
/// with a configuration error while either is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EvolutionPlatformConfig {
    #[serde(default)]
    pub api_url: String,

    #[serde(default)]
    pub api_key: String,
}

/// External platform settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub telegram: TelegramPlatformConfig,

    #[serde(default)]
    pub evolution: EvolutionPlatformConfig,

    /// Per-request timeout for platform calls in seconds
    #[serde(default = "default_platform_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramPlatformConfig::default(),
            evolution: EvolutionPlatformConfig::default(),
            request_timeout_secs: default_platform_request_timeout(),
        }
    }
}

impl PlatformsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Whether console output is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to use colored output
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Whether file output is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Whether to append to existing file
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert LoggerSettings to the runtime LoggerConfig
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console_config = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file_config = self.file.into_file_config()?;

        LoggerConfig::new(console_config, file_config, self.level).map_err(|e| {
            ConfigError::Invalid {
                field: "logger".to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl FileSettings {
    /// Convert FileSettings to FileConfig
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self.parse_format()?;

        FileConfig::new(self.enabled, PathBuf::from(self.path), self.append, format).map_err(
            |e| ConfigError::Invalid {
                field: "logger.file".to_string(),
                message: e.to_string(),
            },
        )
    }

    fn parse_format(&self) -> Result<LogFormat, ConfigError> {
        self.format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::Invalid {
                field: "logger.file.format".to_string(),
                message: e.to_string(),
            })
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
///
/// This structure represents the entire configuration that can be loaded
/// from TOML files and environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application information
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Delivery scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// External platform configuration
    #[serde(default)]
    pub platforms: PlatformsConfig,

    /// Logger configuration
    #[serde(default)]
    pub logger: LoggerSettings,
}
