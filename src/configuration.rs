//! Layered configuration loading (spec §6 Configuration, SPEC_FULL.md §3/§4.12).
//!
//! Grounded on the teacher's `configuration::get_configuration`: a
//! `config`-crate builder reading a YAML file, deserialized into a
//! `Settings` tree. Supplemented per the original system's env-first loader:
//! the flat environment variables spec §6 enumerates always take precedence
//! over the YAML file, applied here as explicit overrides rather than the
//! teacher's plain `File` source alone.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::domain::error::{Error, ErrorKind};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3000
}

#[derive(Clone, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: SecretString,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobEngineSettings {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_instance_startup_timeout_ms")]
    pub instance_startup_timeout_ms: u64,
}

fn default_max_concurrent_jobs() -> usize {
    10
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_poll_interval_ms() -> u64 {
    30_000
}
fn default_instance_startup_timeout_ms() -> u64 {
    600_000
}

impl JobEngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    #[serde(default = "default_instance_details_ttl_secs")]
    pub instance_details_ttl_secs: u64,
    #[serde(default = "default_instance_states_ttl_secs")]
    pub instance_states_ttl_secs: u64,
    #[serde(default = "default_products_ttl_secs")]
    pub products_ttl_secs: u64,
    #[serde(default = "default_templates_ttl_secs")]
    pub templates_ttl_secs: u64,
    #[serde(default = "default_merged_instances_ttl_secs")]
    pub merged_instances_ttl_secs: u64,
    /// Wall-clock time of day, `HH:MM:SS`, at which all caches are cleared.
    #[serde(default = "default_daily_clear_at")]
    pub daily_clear_at: String,
}

fn default_cache_max_size() -> usize {
    1000
}
fn default_instance_details_ttl_secs() -> u64 {
    30
}
fn default_instance_states_ttl_secs() -> u64 {
    60
}
fn default_products_ttl_secs() -> u64 {
    300
}
fn default_templates_ttl_secs() -> u64 {
    600
}
fn default_merged_instances_ttl_secs() -> u64 {
    60
}
fn default_daily_clear_at() -> String {
    "03:00:00".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_circuit_breaker_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_circuit_breaker_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}
fn default_circuit_breaker_timeout_secs() -> u64 {
    60
}

impl CircuitBreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

#[derive(Clone, Deserialize)]
pub struct WebhookSettings {
    pub default_url: Option<String>,
    pub secret: Option<SecretString>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_webhook_retries")]
    pub retries: u32,
}

fn default_webhook_timeout_ms() -> u64 {
    5_000
}
fn default_webhook_retries() -> u32 {
    3
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("default_url", &self.default_url)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("timeout_ms", &self.timeout_ms)
            .field("retries", &self.retries)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationSettings {
    #[serde(default = "default_migration_enabled")]
    pub enabled: bool,
    #[serde(default = "default_migration_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_migration_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_migration_enabled() -> bool {
    true
}
fn default_migration_interval_minutes() -> u64 {
    15
}
fn default_migration_max_concurrent() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionSettings {
    pub default_region: String,
    #[serde(default)]
    pub priority_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub job_engine: JobEngineSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub migration: MigrationSettings,
    pub region: RegionSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for JobEngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_retry_attempts: default_max_retry_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            instance_startup_timeout_ms: default_instance_startup_timeout_ms(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            instance_details_ttl_secs: default_instance_details_ttl_secs(),
            instance_states_ttl_secs: default_instance_states_ttl_secs(),
            products_ttl_secs: default_products_ttl_secs(),
            templates_ttl_secs: default_templates_ttl_secs(),
            merged_instances_ttl_secs: default_merged_instances_ttl_secs(),
            daily_clear_at: default_daily_clear_at(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_circuit_breaker_threshold(),
            recovery_timeout_secs: default_circuit_breaker_timeout_secs(),
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            default_url: None,
            secret: None,
            timeout_ms: default_webhook_timeout_ms(),
            retries: default_webhook_retries(),
        }
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            enabled: default_migration_enabled(),
            interval_minutes: default_migration_interval_minutes(),
            max_concurrent: default_migration_max_concurrent(),
            dry_run: false,
        }
    }
}

/// Flat environment variable name -> dotted settings path, mirroring
/// spec §6's enumerated variable list. Applied as overrides atop the YAML
/// file so env always wins.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PROVIDER_API_KEY", "provider.api_key"),
    ("PROVIDER_BASE_URL", "provider.base_url"),
    ("PORT", "server.port"),
    ("INSTANCE_POLL_INTERVAL", "job_engine.poll_interval_ms"),
    (
        "INSTANCE_STARTUP_TIMEOUT",
        "job_engine.instance_startup_timeout_ms",
    ),
    ("MAX_CONCURRENT_JOBS", "job_engine.max_concurrent_jobs"),
    ("MAX_RETRY_ATTEMPTS", "job_engine.max_retry_attempts"),
    (
        "CIRCUIT_BREAKER_THRESHOLD",
        "circuit_breaker.failure_threshold",
    ),
    (
        "CIRCUIT_BREAKER_TIMEOUT",
        "circuit_breaker.recovery_timeout_secs",
    ),
    ("CACHE_MAX_SIZE", "cache.max_size"),
    ("WEBHOOK_URL", "webhook.default_url"),
    ("WEBHOOK_SECRET", "webhook.secret"),
    ("WEBHOOK_TIMEOUT", "webhook.timeout_ms"),
    ("WEBHOOK_RETRIES", "webhook.retries"),
    ("MIGRATION_ENABLED", "migration.enabled"),
    ("MIGRATION_INTERVAL_MINUTES", "migration.interval_minutes"),
    ("MIGRATION_MAX_CONCURRENT", "migration.max_concurrent"),
    ("MIGRATION_DRY_RUN", "migration.dry_run"),
    ("DEFAULT_REGION", "region.default_region"),
];

pub fn get_configuration() -> crate::domain::error::Result<Settings> {
    dotenvy::dotenv().ok();

    let mut builder = config::Config::builder().add_source(
        config::File::with_name("orchestrator").required(false),
    );

    for (var, path) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(var) {
            builder = builder
                .set_override(*path, value)
                .map_err(config::ConfigError::from)?;
        }
    }

    let settings = builder.build()?.try_deserialize::<Settings>()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> crate::domain::error::Result<()> {
    if settings.provider.base_url.trim().is_empty() {
        return Err(Error::new(
            ErrorKind::Validation,
            "provider.base_url must not be empty",
        ));
    }
    if settings.region.default_region.trim().is_empty() {
        return Err(Error::new(
            ErrorKind::Validation,
            "region.default_region must not be empty",
        ));
    }
    Ok(())
}
