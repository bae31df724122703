//! Logger Module
//!
//! A logging system based on `tracing-subscriber` with support for:
//! - Console output with color control (ANSI only on a TTY)
//! - File output in Full, Compact or JSON format
//! - `EnvFilter` directives for per-module levels

pub mod config;
pub mod error;
pub(crate) mod writer;


pub use config::*;
pub use error::LoggerError;

use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber with the given configuration
pub fn init_logger(config: LoggerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let use_ansi = config.console.colored && std::io::stdout().is_terminal();

    let console_layer = config.console.enabled.then(|| {
        fmt::layer()
            .with_ansi(use_ansi)
            .with_target(true)
            .with_level(true)
    });

    // File layers are registered before the console layer so span fields are
    // not formatted with ANSI codes.
    let (full, compact, json) = if config.file.enabled {
        let writer = writer::open_log_file(&config.file)?;
        match config.file.format {
            LogFormat::Full => (
                Some(fmt::layer().with_ansi(false).with_target(true).with_writer(writer)),
                None,
                None,
            ),
            LogFormat::Compact => (
                None,
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .compact()
                        .with_writer(writer),
                ),
                None,
            ),
            LogFormat::Json => (
                None,
                None,
                Some(fmt::layer().with_ansi(false).json().with_writer(writer)),
            ),
        }
    } else {
        (None, None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(full)
        .with(compact)
        .with(json)
        .with(console_layer)
        .try_init()?;

    Ok(())
}
