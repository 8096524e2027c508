//! Gemini-style generateContent adapter.
//!
//! Auth rides in the query string rather than a header. The protocol has no
//! dedicated system slot among the fields we use, so a system prompt is
//! prepended to the user text, separated by a blank line.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ProviderError;
use crate::llm::http::send_json;
use crate::llm::provider::{Completion, ProviderAdapter};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Adapter for `POST /v1beta/models/{model}:generateContent?key=...`.
pub struct GeminiAdapter {
    client: Client,
    config: ModelConfig,
}

impl GeminiAdapter {
    pub fn new(client: Client, config: ModelConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, key: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!(
            "{base}/v1beta/models/{}:generateContent?key={key}",
            self.config.model
        )
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
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
        let text = match system_prompt {
            Some(system) => format!("{system}\n\n{prompt}"),
            None => prompt.to_string(),
        };

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        };

        let key = self
            .config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default();

        let response: GenerateContentResponse =
            send_json(self.client.post(self.url(&key)).json(&body)).await?;

        let content = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no candidates in response".to_string())
            })?;

        let usage = response.usage_metadata.unwrap_or_default();
        Ok(Completion {
            content,
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}
