//! Configuration merger for CLI arguments and config files
//!
//! CLI flags take precedence over file and environment configuration.

use super::parser::Cli;
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, settings::Settings};

/// Holds file-based settings and applies CLI overrides on top.
pub struct ConfigurationMerger {
    base_config: Settings,
}

impl ConfigurationMerger {
    pub fn new(base_config: Settings) -> Self {
        Self { base_config }
    }

    /// Loads unvalidated settings for `cli`'s `--config` and `--env`.
    ///
    /// Validation runs after the CLI overrides are merged.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut loader = ConfigLoader::new()?;
        if let Some(path) = &cli.config {
            loader = loader.with_config_file(path);
        }
        if let Some(env) = &cli.env {
            loader = loader.with_environment(env.clone().into());
        }
        Ok(Self::new(loader.load_unvalidated()?))
    }

    /// Applies `cli` overrides and validates the result.
    pub fn merge_cli_args(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        let mut config = self.base_config.clone();

        if cli.verbose {
            config.logger.level = "debug".to_string();
        } else if cli.quiet {
            config.logger.level = "error".to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &Settings {
        &self.base_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn create_valid_base_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/courier".to_string();
        config
    }

    #[test]
    fn test_merge_verbose_flag() {
        let merger = ConfigurationMerger::new(create_valid_base_config());
        let cli = Cli::try_parse_from(["courier", "--verbose"]).unwrap();

        let merged = merger.merge_cli_args(&cli).unwrap();
        assert_eq!(merged.logger.level, "debug");
        assert_eq!(merger.config().logger.level, "info");
    }

    #[test]
    fn test_merge_quiet_flag() {
        let merger = ConfigurationMerger::new(create_valid_base_config());
        let cli = Cli::try_parse_from(["courier", "--quiet", "tick"]).unwrap();

        let merged = merger.merge_cli_args(&cli).unwrap();
        assert_eq!(merged.logger.level, "error");
    }

    #[test]
    fn test_merge_without_flags_keeps_level() {
        let mut base = create_valid_base_config();
        base.logger.level = "warn,courier_rs=debug".to_string();
        let merger = ConfigurationMerger::new(base.clone());
        let cli = Cli::try_parse_from(["courier"]).unwrap();

        assert_eq!(merger.merge_cli_args(&cli).unwrap(), base);
    }

    #[test]
    fn test_merge_rejects_invalid_config() {
        let mut base = create_valid_base_config();
        base.scheduler.queue_key = String::new();
        let merger = ConfigurationMerger::new(base);
        let cli = Cli::try_parse_from(["courier"]).unwrap();

        assert!(matches!(
            merger.merge_cli_args(&cli),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
