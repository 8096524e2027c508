//! The provider adapter contract and the `generate` wrapper.
//!
//! Concrete adapters ([`crate::llm::OpenAiAdapter`] and friends) only
//! translate the wire protocol: prompt in, [`Completion`] out, faults
//! classified into [`ProviderError`]. Everything else — the circuit-breaker
//! gate, the per-call deadline, cancellation, latency stamping and the
//! fault→`Reply` encoding — lives in [`Provider::generate`] so every adapter
//! behaves identically under failure.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ModelConfig;
use crate::error::{OrchestratorError, ProviderError};
use crate::llm::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::llm::{ERR_CANCELLED, ERR_CIRCUIT_OPEN, Reply};

/// Raw completion from a provider, before identity and timing are stamped.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One remote text-completion endpoint.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The adapter's configuration (name, model, key, timeout, ...).
    fn config(&self) -> &ModelConfig;

    /// Registry name, e.g. `openai`.
    fn name(&self) -> &str {
        &self.config().provider_name
    }

    /// Model identifier sent on the wire.
    fn model_id(&self) -> &str {
        &self.config().model
    }

    /// Whether the adapter has everything it needs to issue a request: an
    /// API key for authenticated providers, a non-empty model for local ones.
    fn is_configured(&self) -> bool;

    /// Issue one completion request. Transport faults are classified into
    /// [`ProviderError`]; this method must not panic on malformed payloads.
    async fn send_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, ProviderError>;
}

/// A provider adapter plus its resilience state.
///
/// Owned by the registry as `Arc<Provider>`; the breaker is per-provider.
pub struct Provider {
    adapter: Box<dyn ProviderAdapter>,
    breaker: Option<CircuitBreaker>,
}

impl Provider {
    /// Wrap an adapter without a circuit breaker.
    pub fn new(adapter: Box<dyn ProviderAdapter>) -> Self {
        Self {
            adapter,
            breaker: None,
        }
    }

    /// Wrap an adapter with a circuit breaker.
    pub fn with_breaker(adapter: Box<dyn ProviderAdapter>, config: CircuitBreakerConfig) -> Self {
        Self {
            adapter,
            breaker: Some(CircuitBreaker::new(config)),
        }
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn model_id(&self) -> &str {
        self.adapter.model_id()
    }

    /// `name/model`, for logs and analytics.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.name(), self.model_id())
    }

    pub fn is_configured(&self) -> bool {
        self.adapter.is_configured()
    }

    pub fn config(&self) -> &ModelConfig {
        self.adapter.config()
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Run one completion call. Never returns `Err` for remote faults —
    /// those come back as failed [`Reply`]s. The only `Err` is an empty
    /// prompt, rejected at the boundary.
    ///
    /// Failure handling:
    /// - breaker refuses → synthetic `"circuit open"` reply, zero duration,
    ///   no new breaker failure recorded;
    /// - cancellation or per-call timeout → `"cancelled or timed out"`
    ///   reply, breaker not charged (client-side aborts say nothing about
    ///   server health);
    /// - classified HTTP fault → reply with status and any rate-limit info,
    ///   breaker charged;
    /// - anything else → reply with the error text, breaker charged.
    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Reply, OrchestratorError> {
        if prompt.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "prompt must not be empty".to_string(),
            ));
        }

        if let Some(breaker) = &self.breaker {
            if !breaker.allow() {
                tracing::debug!(provider = self.name(), "circuit open, refusing call");
                return Ok(Reply::failed(
                    self.name(),
                    self.model_id(),
                    ERR_CIRCUIT_OPEN,
                    Duration::ZERO,
                ));
            }
        }

        tracing::debug!(
            provider = self.name(),
            model = self.model_id(),
            "dispatching completion request"
        );

        let started = Instant::now();
        let deadline = self.config().timeout;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(deadline, self.adapter.send_request(prompt, system_prompt)) => {
                result.ok()
            }
        };
        let duration = started.elapsed();

        let reply = match outcome {
            None => {
                // Timeout or caller cancellation: do not charge the breaker.
                tracing::debug!(provider = self.name(), ?duration, "call cancelled or timed out");
                Reply::failed(self.name(), self.model_id(), ERR_CANCELLED, duration)
            }
            Some(Ok(completion)) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_success();
                }
                Reply::ok(
                    self.name(),
                    self.model_id(),
                    completion.content,
                    completion.prompt_tokens,
                    completion.completion_tokens,
                    duration,
                )
            }
            Some(Err(error)) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_failure();
                }
                tracing::warn!(
                    provider = self.name(),
                    error = %error,
                    "provider call failed"
                );
                let mut reply =
                    Reply::failed(self.name(), self.model_id(), error.to_string(), duration);
                if let Some(status) = error.http_status() {
                    reply = reply.with_http_status(status);
                }
                if let Some(info) = error.rate_limit() {
                    reply = reply.with_rate_limit_info(info.clone());
                }
                reply
            }
        };

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::rate_limit::RateLimitInfo;

    /// Scripted adapter used across the unit tests.
    struct ScriptedAdapter {
        config: ModelConfig,
        result: fn() -> Result<Completion, ProviderError>,
    }

    impl ScriptedAdapter {
        fn boxed(result: fn() -> Result<Completion, ProviderError>) -> Box<dyn ProviderAdapter> {
            Box::new(Self {
                config: ModelConfig::new("scripted", "test-model"),
                result,
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn config(&self) -> &ModelConfig {
            &self.config
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn send_request(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> Result<Completion, ProviderError> {
            (self.result)()
        }
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let provider = Provider::new(ScriptedAdapter::boxed(|| {
            Ok(Completion {
                content: "unused".into(),
                prompt_tokens: 0,
                completion_tokens: 0,
            })
        }));
        let err = provider
            .generate("   ", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_success_stamps_identity_and_duration() {
        let provider = Provider::new(ScriptedAdapter::boxed(|| {
            Ok(Completion {
                content: "hello".into(),
                prompt_tokens: 7,
                completion_tokens: 3,
            })
        }));
        let reply = provider
            .generate("hi", None, &CancellationToken::new())
            .await
            .expect("valid prompt");
        assert!(reply.success);
        assert_eq!(reply.provider_name, "scripted");
        assert_eq!(reply.model_id, "test-model");
        assert_eq!(reply.total_tokens(), 10);
    }

    #[tokio::test]
    async fn test_http_fault_encoded_in_reply() {
        let provider = Provider::new(ScriptedAdapter::boxed(|| {
            Err(ProviderError::Http {
                status: 429,
                message: "slow down".into(),
                rate_limit: Some(RateLimitInfo {
                    retry_after: Some(Duration::from_secs(2)),
                    ..Default::default()
                }),
            })
        }));
        let reply = provider
            .generate("hi", None, &CancellationToken::new())
            .await
            .expect("fault is a reply, not an error");
        assert!(!reply.success);
        assert!(reply.rate_limited);
        assert_eq!(reply.http_status, Some(429));
        assert_eq!(
            reply.rate_limit_info.as_ref().and_then(|i| i.retry_after),
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn test_circuit_open_refuses_without_calling() {
        let provider = Provider::with_breaker(
            ScriptedAdapter::boxed(|| Err(ProviderError::Network("down".into()))),
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_duration: Duration::from_secs(300),
                half_open_success_threshold: 1,
                enabled: true,
            },
        );
        let cancel = CancellationToken::new();

        // First call fails and trips the breaker.
        let reply = provider.generate("hi", None, &cancel).await.unwrap();
        assert!(!reply.success);

        // Second call is refused with the canonical message and zero duration.
        let reply = provider.generate("hi", None, &cancel).await.unwrap();
        assert_eq!(reply.error_message(), ERR_CIRCUIT_OPEN);
        assert_eq!(reply.duration, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancellation_yields_canonical_message_and_spares_breaker() {
        struct HangingAdapter {
            config: ModelConfig,
        }

        #[async_trait]
        impl ProviderAdapter for HangingAdapter {
            fn config(&self) -> &ModelConfig {
                &self.config
            }
            fn is_configured(&self) -> bool {
                true
            }
            async fn send_request(
                &self,
                _prompt: &str,
                _system_prompt: Option<&str>,
            ) -> Result<Completion, ProviderError> {
                std::future::pending().await
            }
        }

        let provider = Provider::with_breaker(
            Box::new(HangingAdapter {
                config: ModelConfig::new("hang", "m"),
            }),
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_duration: Duration::from_secs(300),
                half_open_success_threshold: 1,
                enabled: true,
            },
        );

        let cancel = CancellationToken::new();
        let pending = provider.generate("hi", None, &cancel);
        cancel.cancel();
        let reply = pending.await.unwrap();
        assert_eq!(reply.error_message(), ERR_CANCELLED);

        // The breaker was not charged, so the next call is still allowed.
        assert!(provider.breaker().expect("breaker attached").allow());
    }

    #[tokio::test]
    async fn test_per_call_timeout() {
        struct SlowAdapter {
            config: ModelConfig,
        }

        #[async_trait]
        impl ProviderAdapter for SlowAdapter {
            fn config(&self) -> &ModelConfig {
                &self.config
            }
            fn is_configured(&self) -> bool {
                true
            }
            async fn send_request(
                &self,
                _prompt: &str,
                _system_prompt: Option<&str>,
            ) -> Result<Completion, ProviderError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Completion {
                    content: "too late".into(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                })
            }
        }

        let provider = Provider::new(Box::new(SlowAdapter {
            config: ModelConfig::new("slow", "m").with_timeout(Duration::from_millis(20)),
        }));
        let reply = provider
            .generate("hi", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.error_message(), ERR_CANCELLED);
    }
}
