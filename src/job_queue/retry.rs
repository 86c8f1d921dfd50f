//! Retry-delay computation for failed jobs (spec §4.1, §8 property 5).
//!
//! Uses the `backoff` crate's `ExponentialBackoff` for the delay curve
//! rather than hand-rolling the doubling, while keeping the exact bounds
//! spec §8 specifies: `nextRetryAt ∈ [100ms·2^(n-1), min(100ms·2^(n-1) +
//! jitter, 5min)]`.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use rand::Rng;

const BASE: Duration = Duration::from_millis(100);
const CAP: Duration = Duration::from_secs(5 * 60);

/// Computes the delay before the `n`th retry (`n = attempts`, 1-indexed).
pub fn next_retry_delay(attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(12);
    let doubled = BASE.saturating_mul(2u32.saturating_pow(exponent));
    let floor = doubled.min(CAP);

    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(BASE)
        .with_multiplier(2.0)
        .with_max_interval(CAP)
        .with_max_elapsed_time(None)
        .build();
    // Advance the curve to the nth interval so jitter is applied at the
    // right magnitude rather than always from the base interval.
    for _ in 0..exponent {
        backoff.next_backoff();
    }
    let with_jitter = backoff.next_backoff().unwrap_or(floor);
    let jitter_ms = rand::rng().random_range(0..=50u64);
    let jittered = with_jitter + Duration::from_millis(jitter_ms);

    jittered.min(CAP).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_is_at_least_base_delay() {
        let delay = next_retry_delay(1);
        assert!(delay >= BASE);
    }

    #[test]
    fn delay_is_capped_at_five_minutes() {
        let delay = next_retry_delay(20);
        assert!(delay <= CAP);
    }

    #[test]
    fn delay_grows_with_attempts() {
        let first = next_retry_delay(1);
        let third = next_retry_delay(3);
        assert!(third >= first);
    }
}
