//! Model provider adapters.
//!
//! Each provider implements the backend trait for its specific API.

mod anthropic;
mod ollama;

pub use anthropic::{AnthropicBackend, DEFAULT_ANTHROPIC_URL};
pub use ollama::{DEFAULT_OLLAMA_URL, OllamaBackend};

use crate::config::{ConfigError, ModelConfig, ProviderKind};
use crate::model::{Backend, ModelError, ModelReply, ModelRequest};

/// Environment variable consulted when no Anthropic key is configured.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// A configured provider.
pub enum Provider {
    Ollama(OllamaBackend),
    Anthropic(AnthropicBackend),
}

impl Provider {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        match config.provider {
            ProviderKind::Ollama => {
                let url = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
                Ok(Self::Ollama(OllamaBackend::new(&config.model).with_url(url)))
            }
            ProviderKind::Anthropic => {
                let api_key = match &config.api_key {
                    Some(key) => key.clone(),
                    None => std::env::var(ANTHROPIC_API_KEY_ENV)
                        .map_err(|_| ConfigError::MissingApiKey)?,
                };
                let mut backend = AnthropicBackend::new(api_key, &config.model);
                if let Some(url) = &config.url {
                    backend = backend.with_url(url);
                }
                Ok(Self::Anthropic(backend))
            }
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama(backend) => std::fmt::Display::fmt(backend, f),
            Self::Anthropic(backend) => std::fmt::Display::fmt(backend, f),
        }
    }
}

impl Backend for Provider {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelError> {
        match self {
            Self::Ollama(backend) => backend.complete(request).await,
            Self::Anthropic(backend) => backend.complete(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_uses_default_url() {
        let config = ModelConfig::default();
        let provider = Provider::from_config(&config).unwrap();
        assert!(matches!(provider, Provider::Ollama(_)));
        assert!(provider.to_string().contains(DEFAULT_OLLAMA_URL));
    }

    #[test]
    fn anthropic_accepts_configured_key() {
        let config = ModelConfig {
            provider: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            url: None,
            api_key: Some("sk-test".to_string()),
        };
        let provider = Provider::from_config(&config).unwrap();
        assert_eq!(provider.to_string(), "anthropic(claude-sonnet-4-20250514)");
    }
}
