use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::adapter::PlatformAdapter;
use super::telegram::TelegramAdapter;
use super::whatsapp::EvolutionAdapter;
use crate::config::PlatformsConfig;
use crate::error::{AppError, AppResult};
use crate::models::PlatformKind;

/// Builds an adapter from an integration's config JSON.
pub type AdapterFactory =
    Arc<dyn Fn(&JsonValue) -> AppResult<Arc<dyn PlatformAdapter>> + Send + Sync>;

/// Maps each `PlatformKind` to the factory of its adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<PlatformKind, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Telegram and Evolution adapters sharing `client`.
    pub fn with_defaults(client: reqwest::Client, config: &PlatformsConfig) -> Self {
        let mut registry = Self::new();

        let telegram = config.telegram.clone();
        let telegram_client = client.clone();
        registry.register(PlatformKind::Telegram, move |value| {
            let adapter = TelegramAdapter::from_config(telegram_client.clone(), &telegram, value)?;
            Ok(Arc::new(adapter) as Arc<dyn PlatformAdapter>)
        });

        let evolution = config.evolution.clone();
        registry.register(PlatformKind::Whatsapp, move |value| {
            let adapter = EvolutionAdapter::from_config(client.clone(), &evolution, value)?;
            Ok(Arc::new(adapter) as Arc<dyn PlatformAdapter>)
        });

        registry
    }

    /// Registers or replaces the factory for `platform`.
    pub fn register<F>(&mut self, platform: PlatformKind, factory: F) -> &mut Self
    where
        F: Fn(&JsonValue) -> AppResult<Arc<dyn PlatformAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(platform, Arc::new(factory));
        self
    }

    /// Builds the adapter for one integration.
    pub fn resolve(
        &self,
        platform: PlatformKind,
        config: &JsonValue,
    ) -> AppResult<Arc<dyn PlatformAdapter>> {
        let factory = self
            .factories
            .get(&platform)
            .ok_or_else(|| AppError::Configuration {
                key: format!("platforms.{}", platform),
                source: anyhow::anyhow!("no adapter registered for platform {}", platform),
            })?;
        factory(config)
    }

    pub fn platforms(&self) -> Vec<PlatformKind> {
        self.factories.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_resolves_by_kind() {
        let mut config = PlatformsConfig::default();
        config.evolution.api_url = "http://evo".to_string();
        config.evolution.api_key = "k".to_string();
        let registry = AdapterRegistry::with_defaults(reqwest::Client::new(), &config);

        let telegram = registry
            .resolve(PlatformKind::Telegram, &json!({ "botToken": "1:a" }))
            .unwrap();
        assert_eq!(telegram.platform(), PlatformKind::Telegram);

        let whatsapp = registry
            .resolve(PlatformKind::Whatsapp, &json!({ "instanceName": "shop" }))
            .unwrap();
        assert_eq!(whatsapp.platform(), PlatformKind::Whatsapp);
    }

    #[test]
    fn test_config_shape_does_not_pick_adapter() {
        let registry =
            AdapterRegistry::with_defaults(reqwest::Client::new(), &PlatformsConfig::default());
        // A Telegram-shaped config under the WhatsApp kind is a configuration error.
        assert!(
            registry
                .resolve(PlatformKind::Whatsapp, &json!({ "botToken": "1:a" }))
                .is_err()
        );
    }

    #[test]
    fn test_unregistered_platform() {
        let registry = AdapterRegistry::new();
        let err = registry
            .resolve(PlatformKind::Telegram, &json!({}))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
        assert!(registry.platforms().is_empty());
    }
}
