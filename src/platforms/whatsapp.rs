//! WhatsApp through the Evolution API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::adapter::{PlatformAdapter, SendOutcome};
use super::http::join_url;
use crate::config::settings::EvolutionPlatformConfig;
use crate::error::{AppError, AppResult};
use crate::models::{EvolutionConfig, PlatformKind};

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTextResponse {
    #[serde(default)]
    key: Option<MessageKey>,
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    #[serde(default)]
    id: Option<String>,
}

pub struct EvolutionAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    instance_name: String,
}

impl EvolutionAdapter {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            instance_name: instance_name.into(),
        }
    }

    /// Builds an adapter from the Evolution settings and an integration's config.
    ///
    /// Fails when the API url or key is not configured.
    pub fn from_config(
        client: reqwest::Client,
        settings: &EvolutionPlatformConfig,
        config: &JsonValue,
    ) -> AppResult<Self> {
        if settings.api_url.trim().is_empty() {
            return Err(AppError::Configuration {
                key: "platforms.evolution.api_url".to_string(),
                source: anyhow::anyhow!("Evolution API url is not configured"),
            });
        }
        if settings.api_key.trim().is_empty() {
            return Err(AppError::Configuration {
                key: "platforms.evolution.api_key".to_string(),
                source: anyhow::anyhow!("Evolution API key is not configured"),
            });
        }

        let parsed = EvolutionConfig::from_json(config).map_err(|e| AppError::Configuration {
            key: "integration.config.instanceName".to_string(),
            source: anyhow::Error::from(e),
        })?;

        Ok(Self::new(
            client,
            settings.api_url.clone(),
            settings.api_key.clone(),
            parsed.instance_name,
        ))
    }

    fn send_text_url(&self) -> String {
        join_url(
            &self.api_url,
            &format!("message/sendText/{}", self.instance_name),
        )
    }
}

#[async_trait]
impl PlatformAdapter for EvolutionAdapter {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Whatsapp
    }

    async fn send(&self, conversation_external_id: &str, content: &str) -> AppResult<SendOutcome> {
        let resp = self
            .client
            .post(self.send_text_url())
            .header("apikey", &self.api_key)
            .json(&SendTextRequest {
                number: conversation_external_id,
                text: content,
            })
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                AppError::ExternalApi {
                    platform: "whatsapp".into(),
                    message: format!("request failed: {}", e),
                    source: Some(e.into()),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Ok(SendOutcome::rejected(format!(
                "Message send failed: {} - {}",
                status.as_u16(),
                text
            )));
        }

        // The id is informational; an unexpected body still counts as sent.
        let data: SendTextResponse = resp.json().await.unwrap_or_default();
        let external_id = data.key.and_then(|k| k.id).or(data.message_id);

        Ok(SendOutcome::delivered(external_id))
    }
}
