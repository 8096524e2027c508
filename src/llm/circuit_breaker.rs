//! Per-provider circuit breaker.
//!
//! Three-state machine protecting `generate` from hammering an unhealthy
//! endpoint: Closed (normal), Open (refusing calls), HalfOpen (probing).
//! Reading [`CircuitBreaker::state`] is itself stateful — it performs the
//! Open → HalfOpen transition once `open_duration` has elapsed, so `allow`
//! and `state` agree on the first post-timeout call.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally; consecutive failures are counted.
    Closed,
    /// Calls are refused until `open_duration` elapses.
    Open,
    /// Probe calls allowed; successes accumulate toward closing.
    HalfOpen,
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that trip the breaker.
    pub failure_threshold: u32,
    /// How long to refuse calls after tripping.
    pub open_duration: Duration,
    /// Successes in HalfOpen needed to close again.
    pub half_open_success_threshold: u32,
    /// When false, the breaker always allows and never transitions.
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_success_threshold: 2,
            enabled: true,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// Thread-safe breaker; one per provider, owned by the [`super::Provider`].
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a call may proceed. True in Closed and HalfOpen; false in
    /// Open until `open_duration` has elapsed (at which point the breaker
    /// moves to HalfOpen and the call becomes the probe).
    pub fn allow(&self) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut inner = self.lock();
        Self::maybe_half_open(&mut inner, &self.config);
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    tracing::info!("circuit breaker closed after successful probes");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                }
            }
            // A success landing while Open (in-flight call from before the
            // trip) does not change the state.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("circuit breaker reopened: probe failed");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    /// Current state. Performs the Open → HalfOpen transition when the open
    /// window has elapsed.
    pub fn state(&self) -> CircuitState {
        if !self.config.enabled {
            return CircuitState::Closed;
        }
        let mut inner = self.lock();
        Self::maybe_half_open(&mut inner, &self.config);
        inner.state
    }

    /// Force the breaker back to Closed, clearing all counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
    }

    fn maybe_half_open(inner: &mut BreakerState, config: &CircuitBreakerConfig) {
        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
            if elapsed >= config.open_duration {
                tracing::info!("circuit breaker half-open: probing");
                inner.state = CircuitState::HalfOpen;
                inner.half_open_successes = 0;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // A poisoned breaker mutex means a panic mid-transition; the state
        // itself is still coherent (plain fields), so keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
