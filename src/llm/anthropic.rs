//! Anthropic-style Messages adapter.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ProviderError;
use crate::llm::http::{join_url, send_json};
use crate::llm::provider::{Completion, ProviderAdapter};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Adapter for `POST /v1/messages` with `x-api-key` auth.
pub struct AnthropicAdapter {
    client: Client,
    config: ModelConfig,
}

impl AnthropicAdapter {
    pub fn new(client: Client, config: ModelConfig) -> Self {
        Self { client, config }
    }

    fn url(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        join_url(base, "v1/messages")
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
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
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![UserMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            system: system_prompt,
            temperature: self.config.temperature,
        };

        let key = self
            .config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default();

        let response: MessagesResponse = send_json(
            self.client
                .post(self.url())
                .header("x-api-key", key)
                .header("anthropic-version", API_VERSION)
                .json(&body),
        )
        .await?;

        let content = response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no content blocks in response".to_string())
            })?;

        let usage = response.usage.unwrap_or_default();
        Ok(Completion {
            content,
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<UserMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct UserMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let a = AnthropicAdapter::new(Client::new(), ModelConfig::new("anthropic", "claude-3-5-haiku"));
        assert_eq!(a.url(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_configured_requires_api_key() {
        let bare = AnthropicAdapter::new(Client::new(), ModelConfig::new("anthropic", "claude"));
        assert!(!bare.is_configured());
        let keyed = AnthropicAdapter::new(
            Client::new(),
            ModelConfig::new("anthropic", "claude").with_api_key("sk-ant-test"),
        );
        assert!(keyed.is_configured());
    }

    #[test]
    fn test_system_prompt_omitted_when_absent() {
        let body = MessagesRequest {
            model: "claude",
            max_tokens: 100,
            messages: vec![UserMessage {
                role: "user",
                content: "hi".into(),
            }],
            system: None,
            temperature: 0.7,
        };
        let json = serde_json::to_value(&body).expect("serializable");
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "content": [{"type": "text", "text": "Paris"}],
            "usage": {"input_tokens": 9, "output_tokens": 2}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).expect("valid payload");
        assert_eq!(parsed.content[0].text, "Paris");
        let usage = parsed.usage.expect("usage present");
        assert_eq!(usage.input_tokens, 9);
        assert_eq!(usage.output_tokens, 2);
    }
}
