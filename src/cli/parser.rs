//! CLI argument parsing with clap
//!
//! Defines the commands of the courier binary and their arguments.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::build;

/// Distributed message delivery scheduler
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Distributed message delivery scheduler")]
#[command(long_about = "
Courier fans user messages out to chat platform conversations (Telegram,
WhatsApp via Evolution API), sends scheduled deliveries when they fall due
and retries failed ones. Any number of instances may run against the same
PostgreSQL database and Redis server.

EXAMPLES:
    # Run the scheduler loops until Ctrl+C
    courier serve

    # Use a custom configuration file
    courier --config /etc/courier/production.toml serve

    # Check configuration without starting
    courier serve --dry-run

    # Run one scheduler tick and print the report
    courier tick

    # Retry eligible failed deliveries now
    courier retry

    # Apply or preview database migrations
    courier migrate
    courier migrate --dry-run
    courier migrate --rollback 1
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Loaded instead of the layered files under COURIER_CONFIG_DIR.
    /// The file must exist and be readable TOML.
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Available values: development (dev), production (prod), test
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the scheduler tick and retry loops (default)
    ///
    /// Examples:
    ///   courier serve             # Run until Ctrl+C or SIGTERM
    ///   courier serve --dry-run   # Validate config without starting
    Serve {
        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,
    },
    /// Database migration operations
    ///
    /// Examples:
    ///   courier migrate                    # Apply all pending migrations
    ///   courier migrate --dry-run          # Show pending migrations without applying
    ///   courier migrate --rollback 3       # Rollback the last 3 migrations
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback (1-100)
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
    /// Run a single scheduler tick and print its report as JSON
    Tick,
    /// Run a single retry sweep and print its report as JSON
    Retry,
}

/// Environment options
#[derive(ValueEnum, Clone, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "production", alias = "prod")]
    Production,
    #[value(name = "test")]
    Test,
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Production => crate::config::Environment::Production,
            Environment::Test => crate::config::Environment::Test,
        }
    }
}
