//! Command executor for dispatching CLI commands
//!
//! Entry point for running a parsed command once configuration is loaded.

use super::handlers::{MigrateCommandHandler, RunOnceCommandHandler, ServeCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::settings::Settings;
use crate::error::AppResult;

/// Execute a CLI command with the given settings
///
/// No subcommand means `serve`.
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    match cli.command.clone().unwrap_or(Commands::Serve { dry_run: false }) {
        Commands::Serve { dry_run } => ServeCommandHandler::new(settings).execute(dry_run).await,
        Commands::Migrate { dry_run, rollback } => {
            if let Some(steps) = rollback
                && steps > 50
            {
                eprintln!(
                    "Warning: Rolling back {} migrations is a large operation. Consider using smaller steps.",
                    steps
                );
            }
            MigrateCommandHandler::new(settings)
                .execute(dry_run, rollback)
                .await
        }
        Commands::Tick => RunOnceCommandHandler::new(settings).tick().await,
        Commands::Retry => RunOnceCommandHandler::new(settings).retry().await,
    }
}
