use std::time::Duration;

use crate::config::PlatformsConfig;
use crate::error::{AppError, AppResult};

/// Builds the HTTP client shared by all platform adapters.
///
/// One client per process keeps connection pools warm across sends.
pub fn build_http_client(config: &PlatformsConfig) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .user_agent(format!("courier-rs/{}", crate::pkg_version()))
        .build()
        .map_err(|e| AppError::Configuration {
            key: "platforms".to_string(),
            source: anyhow::Error::from(e),
        })
}

/// Joins a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
