//! One-shot tick and retry commands.
//!
//! Useful from cron or for operators draining a backlog by hand. The report
//! is printed to stdout as JSON.

use serde::Serialize;

use crate::config::settings::Settings;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Handler for the tick and retry commands
pub struct RunOnceCommandHandler {
    config: Settings,
}

impl RunOnceCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn tick(&self) -> AppResult<()> {
        let state = AppState::build(self.config.clone()).await?;
        let report = state.scheduler.tick().await?;
        print_report(&report)
    }

    pub async fn retry(&self) -> AppResult<()> {
        let state = AppState::build(self.config.clone()).await?;
        let report = state.messages.retry_failed_now().await?;
        print_report(&report)
    }
}

fn print_report<T: Serialize>(report: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(report).map_err(|e| AppError::Internal {
        source: anyhow::Error::from(e),
    })?;
    println!("{}", json);
    Ok(())
}
