//! Long-running scheduler process
//!
//! Handles startup, optional auto-migration, and graceful shutdown of the
//! tick and retry loops.

use crate::cli::handlers::MigrateCommandHandler;
use crate::config::{Environment, settings::Settings};
use crate::error::AppResult;
use crate::state::AppState;
use tokio::signal;

/// Scheduler process manager
pub struct Server {
    settings: Settings,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Start the scheduler loops and run until a shutdown signal
    ///
    /// # Errors
    /// - Migration errors when `database.auto_migrate` is set
    /// - Database or Redis pool initialization errors
    pub async fn run(self) -> AppResult<()> {
        tracing::info!(
            app_name = %self.settings.application.name,
            app_version = %self.settings.application.version,
            environment = %Environment::from_env().as_str(),
            "Application starting"
        );

        tracing::info!(
            max_connections = %self.settings.database.max_connections,
            min_connections = %self.settings.database.min_connections,
            connection_timeout = %self.settings.database.connection_timeout,
            auto_migrate = %self.settings.database.auto_migrate,
            "Database configuration loaded"
        );

        tracing::info!(
            enabled = %self.settings.scheduler.enabled,
            backend = ?self.settings.scheduler.backend,
            claim_strategy = ?self.settings.scheduler.claim_strategy,
            batch_limit = %self.settings.scheduler.batch_limit,
            max_retries = %self.settings.scheduler.max_retries,
            "Scheduler configuration loaded"
        );

        if self.settings.database.auto_migrate {
            MigrateCommandHandler::new(self.settings.clone())
                .run_migrations()
                .await?;
        }

        let state = AppState::build(self.settings).await?;
        tracing::info!("Application state created");

        let scheduler_enabled = state.settings.scheduler.enabled;
        if scheduler_enabled {
            state.scheduler.start().await;
        } else {
            tracing::warn!("Scheduler disabled; waiting for shutdown signal only");
        }

        shutdown_signal().await;

        if scheduler_enabled {
            state.scheduler.stop().await;
        }
        tracing::info!("Shutdown complete");

        Ok(())
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
