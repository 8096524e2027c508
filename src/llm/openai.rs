//! OpenAI-style Chat Completions adapter.
//!
//! Also fits the many third-party endpoints that speak the same protocol
//! (vLLM, LiteLLM, local proxies) — point `base_url` at them.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ProviderError;
use crate::llm::http::{join_url, send_json};
use crate::llm::provider::{Completion, ProviderAdapter};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Adapter for `POST /v1/chat/completions` with Bearer auth.
pub struct OpenAiAdapter {
    client: Client,
    config: ModelConfig,
}

impl OpenAiAdapter {
    pub fn new(client: Client, config: ModelConfig) -> Self {
        Self { client, config }
    }

    fn url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        // Tolerate bases that already carry the /v1 segment.
        if base.ends_with("/v1") {
            join_url(base, "chat/completions")
        } else {
            join_url(base, "v1/chat/completions")
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some() && !self.config.model.trim().is_empty()
    }

    async fn send_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let key = self
            .config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default();

        let response: ChatCompletionResponse = send_json(
            self.client
                .post(self.url())
                .header("Authorization", format!("Bearer {key}"))
                .json(&body),
        )
        .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".to_string()))?;

        let usage = response.usage.unwrap_or_default();
        Ok(Completion {
            content,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
