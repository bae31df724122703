//! Migrate command handler
//!
//! Applies, previews and rolls back the embedded diesel migrations.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::MigrationHarness;

use crate::config::settings::Settings;
use crate::db::MIGRATIONS;
use crate::error::{AppError, AppResult};

/// Handler for the migrate command
pub struct MigrateCommandHandler {
    config: Settings,
}

impl MigrateCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Execute the migrate command with dry-run and rollback support
    ///
    /// # Errors
    /// - Database connection errors
    /// - Migration execution errors
    /// - Rollback of more migrations than are applied
    pub async fn execute(&self, dry_run: bool, rollback: Option<u32>) -> AppResult<()> {
        self.config.database.validate()?;

        if dry_run {
            let pending = self.pending_migrations().await?;
            if pending.is_empty() {
                println!("✓ No pending migrations found - database is up to date");
            } else {
                println!("Found {} pending migration(s):", pending.len());
                for name in &pending {
                    println!("  - {}", name);
                }
                println!("\nRun without --dry-run to apply these migrations");
            }
            return Ok(());
        }

        match rollback {
            Some(steps) => {
                let reverted = self.rollback_migrations(steps).await?;
                println!("✓ Rolled back {} migration(s):", reverted.len());
                for name in &reverted {
                    println!("  - {}", name);
                }
            }
            None => {
                let applied = self.run_migrations().await?;
                if applied.is_empty() {
                    println!("✓ No migrations to apply - database is already up to date");
                } else {
                    println!("✓ Applied {} migration(s):", applied.len());
                    for name in &applied {
                        println!("  - {}", name);
                    }
                }
            }
        }

        Ok(())
    }

    /// Names of migrations not yet applied.
    pub async fn pending_migrations(&self) -> AppResult<Vec<String>> {
        self.with_connection("check pending migrations", |conn| {
            let pending = conn
                .pending_migrations(MIGRATIONS)
                .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
            Ok(pending.iter().map(|m| m.name().to_string()).collect())
        })
        .await
    }

    /// Applies all pending migrations and returns their names.
    pub async fn run_migrations(&self) -> AppResult<Vec<String>> {
        let applied = self
            .with_connection("run pending migrations", |conn| {
                let applied = conn
                    .run_pending_migrations(MIGRATIONS)
                    .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
                Ok(applied.iter().map(|m| m.to_string()).collect::<Vec<_>>())
            })
            .await?;

        tracing::info!(applied = applied.len(), "Database migrations applied");
        Ok(applied)
    }

    /// Reverts the last `steps` migrations and returns their names.
    pub async fn rollback_migrations(&self, steps: u32) -> AppResult<Vec<String>> {
        if steps == 0 {
            return Err(AppError::Validation {
                field: "rollback_steps".to_string(),
                reason: "Number of rollback steps must be greater than 0".to_string(),
            });
        }

        let applied_count = self
            .with_connection("get applied migrations", |conn| {
                let applied = conn
                    .applied_migrations()
                    .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
                Ok(applied.len())
            })
            .await?;

        if applied_count < steps as usize {
            return Err(AppError::Validation {
                field: "rollback_steps".to_string(),
                reason: format!(
                    "Cannot rollback {} migrations - only {} applied migrations available",
                    steps, applied_count
                ),
            });
        }

        self.with_connection("revert migration", move |conn| {
            (0..steps)
                .map(|_| {
                    conn.revert_last_migration(MIGRATIONS)
                        .map(|version| version.to_string())
                        .map_err(|e| anyhow::anyhow!("Migration rollback error: {}", e))
                })
                .collect()
        })
        .await
    }

    /// Runs `f` on a blocking thread with a synchronous PostgreSQL connection.
    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> anyhow::Result<T> + Send + 'static,
    {
        let database_url = self.config.database.url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn =
                PgConnection::establish(&database_url).map_err(|e| AppError::Database {
                    operation: format!("establish connection to {}", operation),
                    source: anyhow::anyhow!("Connection error: {}", e),
                })?;
            f(&mut conn).map_err(|source| AppError::Database {
                operation: operation.to_string(),
                source,
            })
        })
        .await
        .map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
