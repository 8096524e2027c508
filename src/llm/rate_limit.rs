//! Rate-limit metadata parsed from 429 responses.
//!
//! Providers disagree on how they announce throttling, but the common
//! denominator is `Retry-After` (either delta-seconds or an HTTP-date) plus
//! the `X-RateLimit-*` family. Parsing is strictly best-effort: a malformed
//! header value is dropped, never an error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

/// Throttling hints from a 429 response. All fields optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitInfo {
    /// How long the server asked us to wait before retrying.
    pub retry_after: Option<Duration>,
    /// Requests remaining in the current window.
    pub remaining_requests: Option<u32>,
    /// When the current window resets.
    pub reset_at: Option<DateTime<Utc>>,
    /// Total request budget for the window.
    pub limit: Option<u32>,
}

impl RateLimitInfo {
    /// True when no header yielded anything usable.
    pub fn is_empty(&self) -> bool {
        self.retry_after.is_none()
            && self.remaining_requests.is_none()
            && self.reset_at.is_none()
            && self.limit.is_none()
    }
}

/// Parse rate-limit headers from a throttled response.
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    RateLimitInfo {
        retry_after: headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after),
        remaining_requests: header_u32(headers, "x-ratelimit-remaining"),
        reset_at: headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        limit: header_u32(headers, "x-ratelimit-limit"),
    }
}

/// `Retry-After` is either delta-seconds or an HTTP-date (RFC 7231).
fn parse_retry_after(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(raw).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    // A date already in the past means "retry now".
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.trim().parse().ok())
}
