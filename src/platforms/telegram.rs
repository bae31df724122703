//! Telegram Bot API adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::adapter::{PlatformAdapter, SendOutcome};
use super::http::join_url;
use crate::config::settings::TelegramPlatformConfig;
use crate::error::{AppError, AppResult};
use crate::models::{PlatformKind, TelegramConfig};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

pub struct TelegramAdapter {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramAdapter {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
        }
    }

    /// Builds an adapter from an integration's stored config.
    pub fn from_config(
        client: reqwest::Client,
        settings: &TelegramPlatformConfig,
        config: &JsonValue,
    ) -> AppResult<Self> {
        let parsed = TelegramConfig::from_json(config).map_err(|e| AppError::Configuration {
            key: "integration.config.botToken".to_string(),
            source: anyhow::Error::from(e),
        })?;

        if parsed.bot_token.trim().is_empty() {
            return Err(AppError::Configuration {
                key: "integration.config.botToken".to_string(),
                source: anyhow::anyhow!("Telegram bot token is empty"),
            });
        }

        Ok(Self::new(client, settings.api_base.clone(), parsed.bot_token))
    }

    fn send_message_url(&self) -> String {
        join_url(&self.api_base, &format!("bot{}/sendMessage", self.bot_token))
    }

    /// Wraps a transport error without its URL, which carries the bot token.
    fn make_error(context: &str, source: reqwest::Error) -> AppError {
        let source = source.without_url();
        AppError::ExternalApi {
            platform: "telegram".into(),
            message: format!("{}: {}", context, source),
            source: Some(source.into()),
        }
    }
}

#[async_trait]
impl PlatformAdapter for TelegramAdapter {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Telegram
    }

    async fn send(&self, conversation_external_id: &str, content: &str) -> AppResult<SendOutcome> {
        let body = SendMessageRequest {
            chat_id: conversation_external_id,
            text: content,
            parse_mode: "HTML",
        };

        let resp = self
            .client
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::make_error("request failed", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Ok(SendOutcome::rejected(format!(
                "Message send failed: {} - {}",
                status.as_u16(),
                text
            )));
        }

        let data: TelegramResponse = resp
            .json()
            .await
            .map_err(|e| Self::make_error("invalid JSON", e))?;

        if !data.ok {
            return Ok(SendOutcome::rejected(format!(
                "Message send failed: {}",
                data.description.as_deref().unwrap_or("Unknown error")
            )));
        }

        Ok(SendOutcome::delivered(
            data.result.map(|m| m.message_id.to_string()),
        ))
    }
}
