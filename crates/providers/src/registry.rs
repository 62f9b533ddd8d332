//! Provider registry.
//!
//! Resolution order: an adapter registered under the config's provider
//! key, then a default OpenAI-compatible adapter for the known kinds
//! (endpoint from the config's `base_url` override or the kind's default,
//! API key from the config or the conventional environment variable).
//! Built defaults are cached per kind for the life of the registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use cz_domain::agent::{LlmConfig, ProviderKind};
use cz_domain::error::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn LlmProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an adapter under a provider key.
    pub fn register(&self, key: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.write().insert(key.into(), provider);
    }

    /// Resolve the adapter for an agent's LLM settings.
    pub fn resolve(&self, config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
        let key = config.provider.as_str().to_owned();

        if let Some(provider) = self.providers.read().get(&key) {
            return Ok(provider.clone());
        }

        let base_url = config
            .base_url
            .clone()
            .or_else(|| default_base_url(&config.provider).map(str::to_owned))
            .ok_or_else(|| Error::Provider {
                provider: key.clone(),
                message: "no adapter registered and no default endpoint for this provider".into(),
            })?;
        let api_key = config
            .api_key
            .clone()
            .or_else(|| default_api_key_env(&config.provider).and_then(|var| std::env::var(var).ok()));

        let provider: Arc<dyn LlmProvider> =
            Arc::new(OpenAiCompatProvider::new(key.clone(), base_url, api_key)?);
        self.providers.write().insert(key, provider.clone());
        Ok(provider)
    }
}

fn default_base_url(kind: &ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::Openai => Some("https://api.openai.com/v1"),
        ProviderKind::Groq => Some("https://api.groq.com/openai/v1"),
        ProviderKind::Deepseek => Some("https://api.deepseek.com/v1"),
        ProviderKind::Ollama => Some("http://localhost:11434/v1"),
        ProviderKind::Openrouter => Some("https://openrouter.ai/api/v1"),
        ProviderKind::Custom(_) => None,
    }
}

fn default_api_key_env(kind: &ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::Openai => Some("OPENAI_API_KEY"),
        ProviderKind::Groq => Some("GROQ_API_KEY"),
        ProviderKind::Deepseek => Some("DEEPSEEK_API_KEY"),
        ProviderKind::Openrouter => Some("OPENROUTER_API_KEY"),
        ProviderKind::Ollama | ProviderKind::Custom(_) => None,
    }
}
