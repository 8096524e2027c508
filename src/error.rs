//! Error types for the orchestration engine.
//!
//! Provider faults (network errors, bad HTTP statuses, unparseable payloads)
//! never escape `generate` as `Err` values: they are classified into
//! [`ProviderError`] internally and encoded into the failed `Reply` that the
//! caller receives. Only boundary violations — empty prompts, empty provider
//! lists, bad weights — surface as [`OrchestratorError`].

use thiserror::Error;

use crate::llm::rate_limit::RateLimitInfo;

/// Errors rejected synchronously at API boundaries.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Caller passed an invalid argument (empty prompt, empty provider list,
    /// negative weight, quorum below one, unknown scorer name, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No template registered under the requested name.
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// Weight map referenced a scorer name that is not a known built-in.
    #[error("Unknown scorer: {0}")]
    UnknownScorer(String),
}

/// Classified transport-level failure from a provider adapter.
///
/// Produced by `send_request` implementations and converted into a failed
/// `Reply` by the provider wrapper — callers never see this type directly.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Remote endpoint answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
        /// Rate-limit headers, parsed when the status is 429.
        rate_limit: Option<RateLimitInfo>,
    },

    /// Request never produced a response (DNS, connect, TLS, broken pipe).
    #[error("Network error: {0}")]
    Network(String),

    /// Response arrived but its payload could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient faults are worth retrying; permanent ones are not.
    ///
    /// HTTP 429 and the common gateway 5xx statuses are transient; every
    /// other HTTP status (auth failures, bad requests) and payload parse
    /// errors are permanent. Network errors are treated as transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => is_retryable_status(*status),
            ProviderError::Network(_) => true,
            ProviderError::InvalidResponse(_) => false,
        }
    }

    /// HTTP status carried by this error, when there is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Rate-limit info attached to a 429, when present.
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        match self {
            ProviderError::Http { rate_limit, .. } => rate_limit.as_ref(),
            _ => None,
        }
    }
}

/// Statuses eligible for retry: 429 plus the usual upstream 5xx set.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable held a value that failed to parse.
    #[error("Invalid value for {var}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Why parsing failed.
        reason: String,
    },
}
