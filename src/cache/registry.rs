//! The named caches the system uses (spec §4.2) bundled behind one handle,
//! plus the daily wall-clock clear task.
//!
//! Grounded on the teacher's cron-style recurring tasks (e.g.
//! `game::resources::resource_scheduler`): a `tokio::time::interval`-driven
//! background task racing a `CancellationToken` in `tokio::select!`.

use std::time::Duration;

use chrono::{NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::Cache;
use crate::configuration::CacheSettings;
use crate::domain::instance::{InstanceId, InstanceState};
use crate::domain::product::{Product, Template};

pub struct CacheRegistry {
    pub instance_details: Cache<InstanceId, serde_json::Value>,
    pub instance_states: Cache<InstanceId, InstanceState>,
    pub products: Cache<String, Vec<Product>>,
    pub templates: Cache<String, Template>,
    pub merged_instances: Cache<String, Vec<InstanceState>>,
    daily_clear_at: NaiveTime,
}

impl CacheRegistry {
    pub fn new(settings: &CacheSettings) -> Self {
        let daily_clear_at = NaiveTime::parse_from_str(&settings.daily_clear_at, "%H:%M:%S")
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(3, 0, 0).expect("valid constant time"));
        Self {
            instance_details: Cache::new(
                Duration::from_secs(settings.instance_details_ttl_secs),
                settings.max_size,
            ),
            instance_states: Cache::new(
                Duration::from_secs(settings.instance_states_ttl_secs),
                settings.max_size,
            ),
            products: Cache::new(Duration::from_secs(settings.products_ttl_secs), settings.max_size),
            templates: Cache::new(
                Duration::from_secs(settings.templates_ttl_secs),
                settings.max_size,
            ),
            merged_instances: Cache::new(
                Duration::from_secs(settings.merged_instances_ttl_secs),
                settings.max_size,
            ),
            daily_clear_at,
        }
    }

    pub fn clear_all(&self) {
        self.instance_details.clear();
        self.instance_states.clear();
        self.products.clear();
        self.templates.clear();
        self.merged_instances.clear();
    }

    pub fn cleanup_expired_all(&self) -> usize {
        self.instance_details.cleanup_expired()
            + self.instance_states.cleanup_expired()
            + self.products.cleanup_expired()
            + self.templates.cleanup_expired()
            + self.merged_instances.cleanup_expired()
    }

    fn duration_until_next_clear(&self) -> Duration {
        let now = Utc::now();
        let today_clear = now.date_naive().and_time(self.daily_clear_at).and_utc();
        let next = if today_clear > now {
            today_clear
        } else {
            today_clear + chrono::Duration::days(1)
        };
        (next - now).to_std().unwrap_or(Duration::from_secs(1))
    }
}

/// Spawns the daily cache-clear task. Runs until `token` is cancelled.
#[instrument(skip(registry, token))]
pub async fn run_daily_clear(registry: std::sync::Arc<CacheRegistry>, token: CancellationToken) {
    loop {
        let wait = registry.duration_until_next_clear();
        tokio::select! {
            _ = token.cancelled() => {
                info!("daily cache clear task shutting down");
                return;
            }
            _ = tokio::time::sleep(wait) => {
                info!("clearing all caches");
                registry.clear_all();
            }
        }
    }
}
