//! Retry delay policies.
//!
//! A policy answers one question: given the 1-based attempt number that just
//! failed (and any throttling hints), how long should the caller wait before
//! the next attempt — or should it stop? `None` means stop.

use std::time::Duration;

use rand::Rng;

use crate::llm::rate_limit::RateLimitInfo;

/// Fraction of the computed delay used as the jitter window.
const JITTER_FACTOR: f64 = 0.3;

/// Delay policy consulted between attempts.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Same delay every time.
    FixedDelay {
        delay: Duration,
        max_attempts: u32,
    },
    /// `min(cap, base * 2^(attempt-1))`, optionally with uniform jitter in
    /// `[0, 0.3 * delay]` added on top.
    ExponentialBackoff {
        base: Duration,
        cap: Duration,
        jitter: bool,
        max_attempts: u32,
    },
    /// Honours the server's `Retry-After` when present (clamped to `cap`),
    /// otherwise falls back to exponential backoff with jitter. The returned
    /// delay never exceeds `cap`.
    RateLimitAware {
        base: Duration,
        cap: Duration,
        max_attempts: u32,
    },
}

impl RetryPolicy {
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        RetryPolicy::FixedDelay { delay, max_attempts }
    }

    pub fn exponential(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        RetryPolicy::ExponentialBackoff {
            base,
            cap,
            jitter: true,
            max_attempts,
        }
    }

    pub fn exponential_no_jitter(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        RetryPolicy::ExponentialBackoff {
            base,
            cap,
            jitter: false,
            max_attempts,
        }
    }

    pub fn rate_limit_aware(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        RetryPolicy::RateLimitAware {
            base,
            cap,
            max_attempts,
        }
    }

    /// Total attempt budget for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::FixedDelay { max_attempts, .. }
            | RetryPolicy::ExponentialBackoff { max_attempts, .. }
            | RetryPolicy::RateLimitAware { max_attempts, .. } => *max_attempts,
        }
    }

    /// Delay before the attempt after `attempt` (1-based), or `None` to stop.
    ///
    /// `rate_limit` carries throttling hints from the failed attempt; only
    /// the `RateLimitAware` variant consults it.
    pub fn next_delay(
        &self,
        attempt: u32,
        rate_limit: Option<&RateLimitInfo>,
    ) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts() {
            return None;
        }
        match self {
            RetryPolicy::FixedDelay { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                base, cap, jitter, ..
            } => {
                let delay = exponential_delay(*base, *cap, attempt);
                Some(if *jitter { add_jitter(delay) } else { delay })
            }
            RetryPolicy::RateLimitAware { base, cap, .. } => {
                if let Some(retry_after) = rate_limit.and_then(|info| info.retry_after) {
                    return Some(retry_after.min(*cap));
                }
                let delay = add_jitter(exponential_delay(*base, *cap, attempt));
                Some(delay.min(*cap))
            }
        }
    }
}

/// `min(cap, base * 2^(attempt-1))`, saturating on overflow.
fn exponential_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// Add a uniform random extra in `[0, 0.3 * delay]`.
fn add_jitter(delay: Duration) -> Duration {
    let window_ms = (delay.as_millis() as f64 * JITTER_FACTOR) as u64;
    if window_ms == 0 {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(0..=window_ms);
    delay + Duration::from_millis(extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_until_budget() {
        let policy = RetryPolicy::fixed(Duration::from_millis(100), 3);
        assert_eq!(policy.next_delay(1, None), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2, None), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(3, None), None);
        assert_eq!(policy.next_delay(7, None), None);
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let policy =
            RetryPolicy::exponential_no_jitter(Duration::from_millis(100), Duration::from_secs(1), 10);
        assert_eq!(policy.next_delay(1, None), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2, None), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3, None), Some(Duration::from_millis(400)));
        assert_eq!(policy.next_delay(4, None), Some(Duration::from_millis(800)));
        assert_eq!(policy.next_delay(5, None), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(9, None), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exponential_jitter_window() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100), Duration::from_secs(10), 5);
        for _ in 0..50 {
            let delay = policy.next_delay(1, None).expect("within budget");
            assert!(delay >= Duration::from_millis(100), "jitter only adds: {delay:?}");
            assert!(delay <= Duration::from_millis(130), "within 30%: {delay:?}");
        }
    }

    #[test]
    fn test_rate_limit_aware_honours_retry_after() {
        let policy =
            RetryPolicy::rate_limit_aware(Duration::from_millis(100), Duration::from_secs(30), 5);
        let info = RateLimitInfo {
            retry_after: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        assert_eq!(policy.next_delay(1, Some(&info)), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_rate_limit_aware_clamps_retry_after_to_cap() {
        let policy =
            RetryPolicy::rate_limit_aware(Duration::from_millis(100), Duration::from_secs(5), 5);
        let info = RateLimitInfo {
            retry_after: Some(Duration::from_secs(600)),
            ..Default::default()
        };
        assert_eq!(policy.next_delay(1, Some(&info)), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_rate_limit_aware_never_exceeds_cap() {
        let cap = Duration::from_secs(3);
        let policy = RetryPolicy::rate_limit_aware(Duration::from_secs(1), cap, 20);
        for attempt in 1..20 {
            if let Some(delay) = policy.next_delay(attempt, None) {
                assert!(delay <= cap, "attempt {attempt}: {delay:?} exceeds cap");
            }
        }
    }

    #[test]
    fn test_rate_limit_aware_falls_back_to_backoff() {
        let policy =
            RetryPolicy::rate_limit_aware(Duration::from_millis(100), Duration::from_secs(30), 5);
        let delay = policy.next_delay(1, None).expect("within budget");
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(130));
    }

    #[test]
    fn test_attempt_zero_refused() {
        // Attempts are 1-based; zero is a caller bug, refuse rather than loop.
        let policy = RetryPolicy::fixed(Duration::from_millis(1), 3);
        assert_eq!(policy.next_delay(0, None), None);
    }
}
