//! Per-endpoint circuit breaker (spec §4.3).
//!
//! Grounded on the architecture documented in
//! `examples/other_examples/d3a326c8_ipcasj-ethhook__crates-webhook-delivery-src-main.rs`
//! (a `CircuitBreakerManager` gating an outbound worker pool): one breaker
//! per logical endpoint, `CLOSED`/`OPEN`/`HALF_OPEN` states, failures tracked
//! with an `Instant`-based recovery timeout rather than a wall clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Breaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Holds one breaker per logical endpoint key (e.g. `"GET /instances"`).
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if a call to `endpoint` may proceed right now. A
    /// `HALF_OPEN` permit is single-use: the first caller after the recovery
    /// timeout gets the probe, later callers are still refused until the
    /// probe reports its outcome.
    pub fn try_acquire(&self, endpoint: &str) -> bool {
        let mut breakers = self.breakers.lock().expect("circuit breaker lock poisoned");
        let breaker = breakers.entry(endpoint.to_string()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let elapsed = breaker.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    debug!(endpoint, "circuit recovery timeout elapsed, probing");
                    breaker.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&self, endpoint: &str) {
        let mut breakers = self.breakers.lock().expect("circuit breaker lock poisoned");
        let breaker = breakers.entry(endpoint.to_string()).or_insert_with(Breaker::new);
        breaker.consecutive_failures = 0;
        if breaker.state != CircuitState::Closed {
            debug!(endpoint, "circuit closing after successful probe");
        }
        breaker.state = CircuitState::Closed;
        breaker.opened_at = None;
    }

    pub fn on_failure(&self, endpoint: &str) {
        let mut breakers = self.breakers.lock().expect("circuit breaker lock poisoned");
        let breaker = breakers.entry(endpoint.to_string()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::HalfOpen => {
                warn!(endpoint, "probe failed, circuit re-opening");
                breaker.state = CircuitState::Open;
                breaker.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                breaker.consecutive_failures += 1;
                if breaker.consecutive_failures >= self.failure_threshold {
                    warn!(endpoint, failures = breaker.consecutive_failures, "circuit opening");
                    breaker.state = CircuitState::Open;
                    breaker.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state_of(&self, endpoint: &str) -> CircuitState {
        let breakers = self.breakers.lock().expect("circuit breaker lock poisoned");
        breakers.get(endpoint).map(|b| b.state).unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let reg = CircuitBreakerRegistry::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            reg.on_failure("ep");
            assert_eq!(reg.state_of("ep"), CircuitState::Closed);
        }
        reg.on_failure("ep");
        assert_eq!(reg.state_of("ep"), CircuitState::Open);
        assert!(!reg.try_acquire("ep"));
    }

    #[test]
    fn half_open_only_clears_counter_on_success() {
        let reg = CircuitBreakerRegistry::new(1, Duration::from_millis(1));
        reg.on_failure("ep");
        assert_eq!(reg.state_of("ep"), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        assert!(reg.try_acquire("ep"));
        assert_eq!(reg.state_of("ep"), CircuitState::HalfOpen);
        reg.on_failure("ep");
        assert_eq!(reg.state_of("ep"), CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let reg = CircuitBreakerRegistry::new(1, Duration::from_millis(1));
        reg.on_failure("ep");
        std::thread::sleep(Duration::from_millis(5));
        assert!(reg.try_acquire("ep"));
        reg.on_success("ep");
        assert_eq!(reg.state_of("ep"), CircuitState::Closed);
    }
}
