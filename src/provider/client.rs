//! Resilient HTTP transport to the Provider (spec §4.3).
//!
//! Contract: `get/post/put/delete` apply, in order, request-id tagging, rate
//! limiting, the circuit breaker gate, then an attempt loop with exponential
//! backoff. Grounded on the retry/circuit-breaker/rate-limit composition
//! documented in `examples/other_examples/d3a326c8_ipcasj-ethhook__crates-webhook-delivery-src-main.rs`,
//! with `governor` (per `examples/golemcloud-golem/golem-worker-executor`'s
//! manifest) for the rate limiter and `backoff` for delay computation.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{instrument, warn};

use super::circuit_breaker::CircuitBreakerRegistry;
use crate::configuration::{CircuitBreakerSettings, ProviderSettings};
use crate::domain::error::{Error, ErrorKind};

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    limiter: DirectRateLimiter,
    breakers: CircuitBreakerRegistry,
    max_retry_attempts: u32,
}

/// Outstanding-request budget per second before callers start queueing.
const RATE_LIMIT_PER_SECOND: u32 = 20;
/// Bound on how long a caller waits for rate-limit budget before it is
/// surfaced as a `RateLimit` error, per spec §4.3.
const RATE_LIMIT_MAX_WAIT: Duration = Duration::from_secs(10);

impl ProviderClient {
    pub fn new(provider: &ProviderSettings, breaker_settings: &CircuitBreakerSettings) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(RATE_LIMIT_PER_SECOND).expect("constant is nonzero"),
        );
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: provider.api_key.clone(),
            limiter: RateLimiter::direct(quota),
            breakers: CircuitBreakerRegistry::new(
                breaker_settings.failure_threshold,
                breaker_settings.recovery_timeout(),
            ),
            max_retry_attempts: 3,
        }
    }

    pub async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        request_id: &str,
    ) -> Result<R, Error> {
        self.call(Method::GET, path, None::<&()>, request_id).await
    }

    pub async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        request_id: &str,
    ) -> Result<R, Error> {
        self.call(Method::POST, path, Some(body), request_id).await
    }

    pub async fn put<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        request_id: &str,
    ) -> Result<R, Error> {
        self.call(Method::PUT, path, Some(body), request_id).await
    }

    pub async fn delete<R: DeserializeOwned>(
        &self,
        path: &str,
        request_id: &str,
    ) -> Result<R, Error> {
        self.call(Method::DELETE, path, None::<&()>, request_id).await
    }

    #[instrument(skip(self, body), fields(endpoint = %format!("{method} {path}")))]
    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        request_id: &str,
    ) -> Result<R, Error> {
        let endpoint = format!("{method} {path}");

        if tokio::time::timeout(RATE_LIMIT_MAX_WAIT, self.limiter.until_ready())
            .await
            .is_err()
        {
            return Err(Error::new(
                ErrorKind::RateLimit,
                "exceeded Provider rate limit wait budget",
            ));
        }

        if !self.breakers.try_acquire(&endpoint) {
            return Err(Error::new(
                ErrorKind::CircuitBreakerError,
                "circuit open for Provider endpoint",
            ));
        }

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = self.send_once(method.clone(), &url, body, request_id).await;
            match result {
                Ok(value) => {
                    self.breakers.on_success(&endpoint);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempts < self.max_retry_attempts => {
                    self.breakers.on_failure(&endpoint);
                    let delay = backoff_delay(attempts);
                    warn!(attempts, ?delay, "retrying Provider call");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.breakers.on_failure(&endpoint);
                    return Err(err);
                }
            }
        }
    }

    async fn send_once<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        request_id: &str,
    ) -> Result<R, Error> {
        let mut req = self
            .http
            .request(method, url)
            .bearer_auth(self.api_key.expose_secret())
            .header("X-Request-Id", request_id);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            response.json::<R>().await.map_err(Error::from)
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(Error::new(ErrorKind::RateLimit, "Provider returned 429"))
        } else if status.is_client_error() {
            Err(Error::with_detail(
                ErrorKind::ProviderClientError,
                "Provider returned a 4xx response",
                status.to_string(),
            ))
        } else {
            Err(Error::with_detail(
                ErrorKind::ProviderServerError,
                "Provider returned a 5xx response",
                status.to_string(),
            ))
        }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::with_detail(ErrorKind::NetworkError, "network error calling Provider", err.to_string())
    } else {
        Error::from(err)
    }
}

/// `min(1s * 2^(attempts-1), 30s)`, per spec §4.3's client-layer retry
/// policy (base 1s, factor 2, cap 30s).
fn backoff_delay(attempts: u32) -> Duration {
    let base = Duration::from_secs(1);
    let capped_exp = attempts.saturating_sub(1).min(5);
    let scaled = base * 2u32.pow(capped_exp);
    scaled.min(Duration::from_secs(30))
}

pub type SharedProviderClient = Arc<ProviderClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_is_capped_at_30s() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(6), Duration::from_secs(30));
        assert_eq!(backoff_delay(20), Duration::from_secs(30));
    }
}
