//! Gateway configuration: the models and provider credentials to register
//! into a [`tokenhub_router::engine::TokenHubRouter`] at startup.
//!
//! Loaded through the `config` crate's layered builder: a TOML file
//! overridden by `TOKENHUB__`-prefixed environment variables, then
//! validated for cross-field consistency.

use serde::{Deserialize, Serialize};
use tokenhub_router::engine::EngineConfig;
use tokenhub_router::models::Model;

/// Credentials and endpoint for one upstream provider, adapted via
/// [`crate::adapter::OpenAiCompatibleProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub api_key: String,
    /// Defaults to the OpenAI API when omitted; set for OpenAI-compatible
    /// endpoints (self-hosted gateways, other vendors) instead.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderEntry {
    pub fn base_url_or_default(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl GatewayConfig {
    /// Reads `path` if present, then applies any `TOKENHUB__*` environment
    /// overrides (double underscore as the nesting separator, e.g.
    /// `TOKENHUB__ENGINE__ENABLE_SCORER=false`), then validates.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("TOKENHUB").separator("__"))
            .build()?;
        let parsed: GatewayConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Every model must reference a configured provider; at least one model
    /// must be present or the engine would have nothing to route to.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("at least one model must be configured");
        }
        for model in &self.models {
            if !self.providers.iter().any(|p| p.id == model.provider_id) {
                anyhow::bail!(
                    "model '{}' references unregistered provider '{}'",
                    model.id,
                    model.provider_id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str) -> ProviderEntry {
        ProviderEntry {
            id: id.to_string(),
            api_key: "sk-test".to_string(),
            base_url: None,
        }
    }

    fn model(id: &str, provider_id: &str) -> Model {
        Model {
            id: id.to_string(),
            provider_id: provider_id.to_string(),
            weight: 5,
            max_context_tokens: 4096,
            input_price_per_1k: 0.0,
            output_price_per_1k: 0.0,
            enabled: true,
        }
    }

    #[test]
    fn rejects_empty_model_list() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_model_with_unregistered_provider() {
        let config = GatewayConfig {
            providers: vec![provider("p1")],
            models: vec![model("m1", "p2")],
            engine: EngineConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_matching_provider_and_model() {
        let config = GatewayConfig {
            providers: vec![provider("p1")],
            models: vec![model("m1", "p1")],
            engine: EngineConfig::default(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn base_url_defaults_to_openai() {
        let entry = provider("p1");
        assert_eq!(entry.base_url_or_default(), "https://api.openai.com/v1");
    }
}
