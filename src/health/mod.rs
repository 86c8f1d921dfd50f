//! Application-level endpoint health probing (spec §4.7).

use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::instrument;

use crate::domain::instance::{HealthCheckState, HealthProbeResult, HealthStatus, PortMapping};
use crate::domain::job::HealthCheckConfig;

const BODY_INSPECTION_LIMIT_BYTES: usize = 8 * 1024;

const BAD_BODY_MARKERS: &[&str] = &[
    "bad gateway",
    "service unavailable",
    "internal server error",
    "gateway timeout",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Healthy,
    Unhealthy,
}

/// Runs every port mapping's probe (optionally filtered to `targetPort`) in
/// parallel and aggregates into a single `HealthCheckState`.
#[instrument(skip(http, port_mappings, config))]
pub async fn check(
    http: &reqwest::Client,
    port_mappings: &[PortMapping],
    config: &HealthCheckConfig,
) -> HealthCheckState {
    let targets: Vec<&PortMapping> = port_mappings
        .iter()
        .filter(|m| config.target_port.is_none_or(|target| target == m.port))
        .collect();

    let probes = targets
        .into_iter()
        .map(|mapping| probe_one(http, mapping, config));
    let results: Vec<HealthProbeResult> = join_all(probes).await;

    let status = aggregate(&results);
    HealthCheckState { status, results }
}

fn aggregate(results: &[HealthProbeResult]) -> HealthStatus {
    if results.is_empty() {
        return HealthStatus::Healthy;
    }
    let healthy = results.iter().filter(|r| r.status == HealthStatus::Healthy).count();
    if healthy == results.len() {
        HealthStatus::Healthy
    } else if healthy == 0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Partial
    }
}

async fn probe_one(
    http: &reqwest::Client,
    mapping: &PortMapping,
    config: &HealthCheckConfig,
) -> HealthProbeResult {
    let max_attempts = config.max_retries + 1;
    let mut last_error = None;
    let mut categorized_error = None;
    let mut last_response_time = None;

    for attempt in 1..=max_attempts {
        let started = Instant::now();
        let outcome = attempt_probe(http, &mapping.endpoint, config.timeout_ms).await;
        let elapsed = started.elapsed();
        last_response_time = Some(elapsed.as_millis() as u64);

        match outcome {
            Ok(()) => {
                return HealthProbeResult {
                    port: mapping.port,
                    status: HealthStatus::Healthy,
                    attempts: attempt,
                    last_error: None,
                    response_time_ms: last_response_time,
                    categorized_error: None,
                };
            }
            Err(ProbeError::BadBody(reason)) => {
                // Application-level bad-body responses are not retried
                // within a single check invocation (spec §4.7).
                return HealthProbeResult {
                    port: mapping.port,
                    status: HealthStatus::Unhealthy,
                    attempts: attempt,
                    last_error: Some(reason),
                    response_time_ms: last_response_time,
                    categorized_error: Some("BAD_BODY".to_string()),
                };
            }
            Err(ProbeError::HttpStatus(status)) => {
                last_error = Some(format!("HTTP {status}"));
                categorized_error = Some("HTTP_ERROR".to_string());
                if attempt < max_attempts {
                    sleep_backoff(config.retry_delay_ms, attempt).await;
                }
            }
            Err(ProbeError::Network(category, message)) => {
                last_error = Some(message);
                categorized_error = Some(category);
                if attempt < max_attempts {
                    sleep_backoff(config.retry_delay_ms, attempt).await;
                }
            }
        }
    }

    HealthProbeResult {
        port: mapping.port,
        status: HealthStatus::Unhealthy,
        attempts: max_attempts,
        last_error,
        response_time_ms: last_response_time,
        categorized_error,
    }
}

enum ProbeError {
    HttpStatus(u16),
    Network(String, String),
    BadBody(String),
}

async fn attempt_probe(http: &reqwest::Client, endpoint: &str, timeout_ms: u64) -> Result<(), ProbeError> {
    let response = http
        .get(endpoint)
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
        .map_err(categorize_network_error)?;

    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(ProbeError::HttpStatus(status.as_u16()));
    }

    let body = response
        .text()
        .await
        .map_err(categorize_network_error)?;
    let inspected = &body.as_bytes()[..body.len().min(BODY_INSPECTION_LIMIT_BYTES)];
    let inspected = String::from_utf8_lossy(inspected).to_lowercase();
    if let Some(marker) = BAD_BODY_MARKERS.iter().find(|m| inspected.contains(**m)) {
        return Err(ProbeError::BadBody(format!("response body contains \"{marker}\"")));
    }
    Ok(())
}

fn categorize_network_error(err: reqwest::Error) -> ProbeError {
    let category = if err.is_timeout() {
        "TIMEOUT"
    } else if err.is_connect() {
        "CONNECTION_REFUSED"
    } else if err.to_string().to_lowercase().contains("dns") {
        "DNS_FAILURE"
    } else if err.to_string().to_lowercase().contains("tls") || err.to_string().to_lowercase().contains("certificate") {
        "TLS_ERROR"
    } else {
        "UNKNOWN"
    };
    ProbeError::Network(category.to_string(), err.to_string())
}

async fn sleep_backoff(base_ms: u64, attempt: u32) {
    let delay = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::PortType;

    fn mapping(port: u16, endpoint: &str) -> PortMapping {
        PortMapping {
            port,
            endpoint: endpoint.to_string(),
            port_type: PortType::Http,
        }
    }

    #[test]
    fn aggregate_all_healthy() {
        let results = vec![
            HealthProbeResult {
                port: 1,
                status: HealthStatus::Healthy,
                attempts: 1,
                last_error: None,
                response_time_ms: Some(1),
                categorized_error: None,
            },
            HealthProbeResult {
                port: 2,
                status: HealthStatus::Healthy,
                attempts: 1,
                last_error: None,
                response_time_ms: Some(1),
                categorized_error: None,
            },
        ];
        assert_eq!(aggregate(&results), HealthStatus::Healthy);
    }

    #[test]
    fn aggregate_mixed_is_partial() {
        let results = vec![
            HealthProbeResult {
                port: 1,
                status: HealthStatus::Healthy,
                attempts: 1,
                last_error: None,
                response_time_ms: Some(1),
                categorized_error: None,
            },
            HealthProbeResult {
                port: 2,
                status: HealthStatus::Unhealthy,
                attempts: 1,
                last_error: Some("bad".to_string()),
                response_time_ms: Some(1),
                categorized_error: None,
            },
        ];
        assert_eq!(aggregate(&results), HealthStatus::Partial);
    }

    #[test]
    fn aggregate_all_unhealthy() {
        let results = vec![HealthProbeResult {
            port: 1,
            status: HealthStatus::Unhealthy,
            attempts: 1,
            last_error: Some("bad".to_string()),
            response_time_ms: Some(1),
            categorized_error: None,
        }];
        assert_eq!(aggregate(&results), HealthStatus::Unhealthy);
    }

    #[test]
    fn target_port_filters_mappings() {
        let mappings = vec![mapping(8888, "http://x:8888"), mapping(9999, "http://x:9999")];
        let filtered: Vec<&PortMapping> = mappings.iter().filter(|m| m.port == 8888).collect();
        assert_eq!(filtered.len(), 1);
    }
}
