//! Serve command handler
//!
//! Handles the serve command including dry-run validation and the
//! long-running scheduler process.

use crate::config::settings::{SchedulerBackend, Settings};
use crate::error::AppResult;
use crate::server::Server;

/// Handler for the serve command
pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Runs the scheduler until a shutdown signal, or only validates with `dry_run`.
    pub async fn execute(&self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            return self.validate_only();
        }
        Server::new(self.config.clone()).run().await
    }

    /// Validate configuration without connecting to anything
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;

        let scheduler = &self.config.scheduler;
        println!("✓ Configuration is valid");
        println!("✓ Database URL is configured");
        match scheduler.backend {
            SchedulerBackend::Redis => println!(
                "✓ Scheduler backend: redis (key prefix '{}')",
                self.config.redis.key_prefix
            ),
            SchedulerBackend::Memory => println!("✓ Scheduler backend: memory (single instance)"),
        }
        println!(
            "✓ Tick every {}s, retry sweep every {}s, claim strategy {:?}",
            scheduler.tick_interval_secs, scheduler.retry_interval_secs, scheduler.claim_strategy
        );
        println!("✓ Logger configuration is valid");

        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
