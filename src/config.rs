//! Per-provider model configuration, loaded from the environment.
//!
//! Each provider adapter owns one [`ModelConfig`]. Keys come from
//! `{PREFIX}_API_KEY`-style environment variables (call `dotenvy::dotenv()`
//! yourself if you keep them in a `.env` file); everything else has a
//! sensible default. API keys are wrapped in [`SecretString`] so they never
//! appear in `Debug` output or logs.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Configuration for one provider adapter.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Registry name for this provider (unique, case-insensitive).
    pub provider_name: String,
    /// Model identifier sent on the wire (e.g. `gpt-4o-mini`).
    pub model: String,
    /// API key for authenticated providers. `None` for local providers.
    pub api_key: Option<SecretString>,
    /// Endpoint base URL override. Each adapter has its own default.
    pub base_url: Option<String>,
    /// Completion token budget per request.
    pub max_tokens: u32,
    /// Per-call deadline, layered on top of caller cancellation.
    pub timeout: Duration,
    /// Sampling temperature, clamped to `[0, 2]`.
    pub temperature: f32,
}

impl ModelConfig {
    /// Create a config with defaults for everything but name and model.
    pub fn new(provider_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the sampling temperature, clamping to the valid `[0, 2]` range.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Load a config from `{prefix}_API_KEY`, `{prefix}_MODEL`,
    /// `{prefix}_BASE_URL`, `{prefix}_MAX_TOKENS`, `{prefix}_TIMEOUT_SECS`
    /// and `{prefix}_TEMPERATURE`.
    ///
    /// Unset variables fall back to `default_model` and the standard
    /// defaults. Set-but-unparseable numeric variables are an error rather
    /// than a silent fallback.
    pub fn from_env(
        provider_name: &str,
        prefix: &str,
        default_model: &str,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::new(
            provider_name,
            optional_env(&format!("{prefix}_MODEL")).unwrap_or_else(|| default_model.to_string()),
        );

        if let Some(key) = optional_env(&format!("{prefix}_API_KEY")) {
            config.api_key = Some(SecretString::from(key));
        }
        config.base_url = optional_env(&format!("{prefix}_BASE_URL"));

        if let Some(max_tokens) = parse_optional_env::<u32>(&format!("{prefix}_MAX_TOKENS"))? {
            config.max_tokens = max_tokens;
        }
        if let Some(secs) = parse_optional_env::<u64>(&format!("{prefix}_TIMEOUT_SECS"))? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(temperature) = parse_optional_env::<f32>(&format!("{prefix}_TEMPERATURE"))? {
            config.temperature = temperature.clamp(0.0, 2.0);
        }

        Ok(config)
    }
}

/// Load variables from a `.env` file when one exists. Call once at startup,
/// before building configs; already-set process variables win.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment from .env");
    }
}

/// Read an environment variable, treating empty values as unset.
pub(crate) fn optional_env(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Parse an optional environment variable into `T`, erroring on bad values.
pub(crate) fn parse_optional_env<T: std::str::FromStr>(
    var: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional_env(var) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ConfigError::InvalidEnv {
                var: var.to_string(),
                reason: e.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::new("openai", "gpt-4o-mini");
        assert_eq!(config.provider_name, "openai");
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(config.api_key.is_none());
        assert!(config.base_url.is_none());
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_temperature_clamped() {
        let config = ModelConfig::new("openai", "m").with_temperature(5.0);
        assert_eq!(config.temperature, 2.0);
        let config = ModelConfig::new("openai", "m").with_temperature(-1.0);
        assert_eq!(config.temperature, 0.0);
    }

    #[test]
    fn test_from_env_reads_prefixed_variables() {
        // Unique prefix so parallel tests don't collide on env state.
        unsafe {
            std::env::set_var("CHORUS_TEST_CFG_MODEL", "custom-model");
            std::env::set_var("CHORUS_TEST_CFG_MAX_TOKENS", "256");
            std::env::set_var("CHORUS_TEST_CFG_TIMEOUT_SECS", "5");
        }

        let config = ModelConfig::from_env("test", "CHORUS_TEST_CFG", "default-model")
            .expect("valid env");
        assert_eq!(config.model, "custom-model");
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.timeout, Duration::from_secs(5));

        unsafe {
            std::env::remove_var("CHORUS_TEST_CFG_MODEL");
            std::env::remove_var("CHORUS_TEST_CFG_MAX_TOKENS");
            std::env::remove_var("CHORUS_TEST_CFG_TIMEOUT_SECS");
        }
    }

    #[test]
    fn test_from_env_rejects_garbage_numbers() {
        unsafe {
            std::env::set_var("CHORUS_TEST_BAD_MAX_TOKENS", "lots");
        }
        let err = ModelConfig::from_env("test", "CHORUS_TEST_BAD", "m").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
        unsafe {
            std::env::remove_var("CHORUS_TEST_BAD_MAX_TOKENS");
        }
    }
}
