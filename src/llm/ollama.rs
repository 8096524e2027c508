//! Ollama-style local completion adapter.
//!
//! No authentication; configured means "a model name is set". Streaming is
//! explicitly disabled so the reply arrives as one JSON document.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ProviderError;
use crate::llm::http::{join_url, send_json};
use crate::llm::provider::{Completion, ProviderAdapter};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Adapter for `POST {base}/api/generate`.
pub struct OllamaAdapter {
    client: Client,
    config: ModelConfig,
}

impl OllamaAdapter {
    pub fn new(client: Client, config: ModelConfig) -> Self {
        Self { client, config }
    }

    fn url(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        join_url(base, "api/generate")
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn is_configured(&self) -> bool {
        !self.config.model.trim().is_empty()
    }

    async fn send_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            system: system_prompt,
            stream: false,
        };

        let response: GenerateResponse =
            send_json(self.client.post(self.url()).json(&body)).await?;

        Ok(Completion {
            content: response.response,
            prompt_tokens: response.prompt_eval_count,
            completion_tokens: response.eval_count,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}
