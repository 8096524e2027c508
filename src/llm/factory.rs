//! Constructor table for provider adapters.
//!
//! Adapters are built from a `(client, config)` pair looked up by name —
//! an explicit table instead of runtime type introspection. Registering a
//! custom provider is one `insert` away.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

use crate::config::ModelConfig;
use crate::llm::anthropic::AnthropicAdapter;
use crate::llm::gemini::GeminiAdapter;
use crate::llm::http::shared_client;
use crate::llm::ollama::OllamaAdapter;
use crate::llm::openai::OpenAiAdapter;
use crate::llm::provider::ProviderAdapter;

/// Builds one adapter from an HTTP client and its config.
pub type AdapterBuilder =
    Arc<dyn Fn(Client, ModelConfig) -> Box<dyn ProviderAdapter> + Send + Sync>;

/// Name → constructor table.
pub struct ProviderFactory {
    builders: HashMap<String, AdapterBuilder>,
}

impl ProviderFactory {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Table seeded with the four standard adapters: `openai`, `anthropic`,
    /// `gemini`, `ollama`.
    pub fn builtin() -> Self {
        let mut factory = Self::new();
        factory.register("openai", |client, config| {
            Box::new(OpenAiAdapter::new(client, config))
        });
        factory.register("anthropic", |client, config| {
            Box::new(AnthropicAdapter::new(client, config))
        });
        factory.register("gemini", |client, config| {
            Box::new(GeminiAdapter::new(client, config))
        });
        factory.register("ollama", |client, config| {
            Box::new(OllamaAdapter::new(client, config))
        });
        factory
    }

    /// Register (or replace) a constructor under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(Client, ModelConfig) -> Box<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        self.builders
            .insert(name.into().to_lowercase(), Arc::new(builder));
    }

    /// Build an adapter with a caller-supplied client.
    pub fn build_with_client(
        &self,
        name: &str,
        client: Client,
        config: ModelConfig,
    ) -> Option<Box<dyn ProviderAdapter>> {
        self.builders
            .get(&name.to_lowercase())
            .map(|builder| builder(client, config))
    }

    /// Build an adapter with the shared HTTP client.
    pub fn build(&self, name: &str, config: ModelConfig) -> Option<Box<dyn ProviderAdapter>> {
        self.build_with_client(name, shared_client().clone(), config)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builders.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::builtin()
    }
}
