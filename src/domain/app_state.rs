//! Shared application handle threaded through Axum extractors.
//!
//! Grounded on the teacher's `domain::app_state`: an `App` struct holding the
//! shared subsystem handles behind `Arc`, wrapped in a `Clone + Deref`
//! `AppState` newtype extractable via `FromRequestParts`.

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::FromRequestParts;
use derive_more::Deref;

use crate::cache::registry::CacheRegistry;
use crate::configuration::Settings;
use crate::instance_store::InstanceStore;
use crate::job_queue::JobQueue;
use crate::migration_scheduler::MigrationSchedulerHandle;
use crate::provider::service::ProviderService;

pub type AppQueue = Arc<JobQueue>;
pub type AppStore = Arc<InstanceStore>;
pub type AppCaches = Arc<CacheRegistry>;
pub type AppProvider = Arc<ProviderService>;
pub type AppMigrationScheduler = Arc<MigrationSchedulerHandle>;
pub type AppSettings = Arc<Settings>;

impl FromRef<AppState> for AppQueue {
    fn from_ref(state: &AppState) -> Self {
        state.0.job_queue.clone()
    }
}

impl FromRef<AppState> for AppStore {
    fn from_ref(state: &AppState) -> Self {
        state.0.instance_store.clone()
    }
}

impl FromRef<AppState> for AppCaches {
    fn from_ref(state: &AppState) -> Self {
        state.0.caches.clone()
    }
}

impl FromRef<AppState> for AppProvider {
    fn from_ref(state: &AppState) -> Self {
        state.0.provider.clone()
    }
}

impl FromRef<AppState> for AppMigrationScheduler {
    fn from_ref(state: &AppState) -> Self {
        state.0.migration_scheduler.clone()
    }
}

impl FromRef<AppState> for AppSettings {
    fn from_ref(state: &AppState) -> Self {
        state.0.settings.clone()
    }
}

pub struct App {
    pub job_queue: AppQueue,
    pub instance_store: AppStore,
    pub caches: AppCaches,
    pub provider: AppProvider,
    /// Shared with the background `migration_scheduler::run_scheduler` task
    /// so the singleton run lock (spec §4.9) is the same lock whether a run
    /// is cron-triggered or REST-triggered.
    pub migration_scheduler: AppMigrationScheduler,
    pub settings: Arc<Settings>,
}

impl App {
    pub fn new(
        settings: Arc<Settings>,
        job_queue: AppQueue,
        instance_store: AppStore,
        caches: AppCaches,
        provider: AppProvider,
        migration_scheduler: AppMigrationScheduler,
    ) -> Self {
        Self {
            job_queue,
            instance_store,
            caches,
            provider,
            migration_scheduler,
            settings,
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, FromRequestParts, Deref)]
#[from_request(via(axum::extract::State))]
pub struct AppState(pub Arc<App>);
