//! Shared HTTP plumbing for the wire adapters.

use std::sync::LazyLock;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::llm::rate_limit::parse_rate_limit_headers;

/// Shared HTTP client for providers that don't need custom settings.
///
/// Reusing one client shares connection pools, DNS cache, and TLS sessions
/// across adapters.
pub fn shared_client() -> &'static Client {
    static CLIENT: LazyLock<Client> = LazyLock::new(Client::new);
    &CLIENT
}

/// Send a prepared request and decode a JSON payload.
///
/// Classification: transport failures become [`ProviderError::Network`],
/// non-success statuses become [`ProviderError::Http`] (with rate-limit
/// headers parsed on 429), and undecodable payloads become
/// [`ProviderError::InvalidResponse`].
pub(crate) async fn send_json<R: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<R, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let rate_limit = (status.as_u16() == 429)
            .then(|| parse_rate_limit_headers(response.headers()));
        let message = response.text().await.unwrap_or_default();
        let message = if message.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            message
        };
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message,
            rate_limit,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::InvalidResponse(format!("JSON parse error: {e}")))
}

/// Join a base URL and path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
