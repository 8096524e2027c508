//! Provider adapters and the resilience layer around them.
//!
//! A [`Provider`] wraps one remote text-completion endpoint behind a uniform
//! `generate` call that never fails for remote reasons: every network fault,
//! bad status, timeout or open circuit is encoded in the returned [`Reply`].
//! Only argument errors (an empty prompt) surface as `Err`.

pub mod anthropic;
pub mod circuit_breaker;
pub mod factory;
pub mod gemini;
pub(crate) mod http;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod rate_limit;
pub mod registry;
pub mod retry;

use std::time::Duration;

use serde::Serialize;

pub use anthropic::AnthropicAdapter;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use factory::ProviderFactory;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use provider::{Completion, Provider, ProviderAdapter};
pub use rate_limit::RateLimitInfo;
pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;

/// Canonical failure message when the circuit breaker refuses a call.
pub const ERR_CIRCUIT_OPEN: &str = "circuit open";

/// Canonical failure message for caller cancellation or per-call timeout.
pub const ERR_CANCELLED: &str = "cancelled or timed out";

/// One provider's answer to one prompt.
///
/// Built by [`Provider::generate`] and immutable afterwards. Invariant:
/// a failed reply always carries a non-empty `error`; a successful reply
/// always carries `content` (possibly the empty string).
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    /// Registry name of the provider that produced this reply.
    pub provider_name: String,
    /// Model identifier the provider used.
    pub model_id: String,
    /// Completion text. Empty on failure.
    pub content: String,
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
    /// Wall-clock time for the call. Zero for circuit-open refusals.
    pub duration: Duration,
    /// Whether the call produced a usable completion.
    pub success: bool,
    /// Failure reason. Always present and non-empty when `success` is false.
    pub error: Option<String>,
    /// Whether the failure was an HTTP 429.
    pub rate_limited: bool,
    /// HTTP status of the failed response, when there was one.
    pub http_status: Option<u16>,
    /// Parsed throttling hints from a 429 response.
    #[serde(skip)]
    pub rate_limit_info: Option<RateLimitInfo>,
}

impl Reply {
    /// Successful reply.
    pub fn ok(
        provider_name: impl Into<String>,
        model_id: impl Into<String>,
        content: impl Into<String>,
        prompt_tokens: u32,
        completion_tokens: u32,
        duration: Duration,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            model_id: model_id.into(),
            content: content.into(),
            prompt_tokens,
            completion_tokens,
            duration,
            success: true,
            error: None,
            rate_limited: false,
            http_status: None,
            rate_limit_info: None,
        }
    }

    /// Failed reply. An empty `error` is replaced with a generic message so
    /// the failure invariant holds.
    pub fn failed(
        provider_name: impl Into<String>,
        model_id: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "unknown provider failure".to_string()
        } else {
            error
        };
        Self {
            provider_name: provider_name.into(),
            model_id: model_id.into(),
            content: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            duration,
            success: false,
            error: Some(error),
            rate_limited: false,
            http_status: None,
            rate_limit_info: None,
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self.rate_limited = status == 429;
        self
    }

    pub fn with_rate_limit_info(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit_info = Some(info);
        self
    }

    /// Prompt plus completion tokens.
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Failure reason, or the empty string for successful replies.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}
