#![allow(dead_code)]

use std::sync::Arc;

use gpu_orchestrator::cache::registry::CacheRegistry;
use gpu_orchestrator::configuration::{ProviderSettings, RegionSettings, Settings};
use gpu_orchestrator::domain::app_state::{App, AppState};
use gpu_orchestrator::instance_store::InstanceStore;
use gpu_orchestrator::job_queue::JobQueue;
use gpu_orchestrator::migration_scheduler::MigrationSchedulerHandle;
use gpu_orchestrator::net::router;
use gpu_orchestrator::provider::client::ProviderClient;
use gpu_orchestrator::provider::service::ProviderService;
use secrecy::SecretString;

/// Everything a test needs to drive the system without a live Provider:
/// every in-memory subsystem plus a router wired against them, and a
/// `wiremock::MockServer` standing in for the Provider's HTTP API.
pub struct TestHarness {
    pub router: axum::Router,
    pub instance_store: Arc<InstanceStore>,
    pub job_queue: Arc<JobQueue>,
    pub provider: Arc<ProviderService>,
    pub migration_scheduler: Arc<MigrationSchedulerHandle>,
    pub caches: Arc<CacheRegistry>,
    pub settings: Arc<Settings>,
    pub mock_server: wiremock::MockServer,
}

impl TestHarness {
    pub async fn new() -> Self {
        let mock_server = wiremock::MockServer::start().await;

        let settings = Arc::new(Settings {
            server: Default::default(),
            provider: ProviderSettings {
                base_url: mock_server.uri(),
                api_key: SecretString::new("test-key".into()),
            },
            job_engine: Default::default(),
            cache: Default::default(),
            circuit_breaker: Default::default(),
            webhook: Default::default(),
            migration: Default::default(),
            region: RegionSettings {
                default_region: "us-east-1".to_string(),
                priority_list: vec!["us-east-1".to_string(), "us-west-2".to_string()],
            },
        });

        let caches = Arc::new(CacheRegistry::new(&settings.cache));
        let instance_store = Arc::new(InstanceStore::new(caches.clone()));
        let job_queue = Arc::new(JobQueue::new());
        let client = Arc::new(ProviderClient::new(&settings.provider, &settings.circuit_breaker));
        let provider = Arc::new(ProviderService::new(client, caches.clone()));
        let migration_scheduler = Arc::new(MigrationSchedulerHandle::new(
            job_queue.clone(),
            instance_store.clone(),
            provider.clone(),
            settings.migration.max_concurrent,
            settings.migration.dry_run,
        ));

        let app_state = AppState(Arc::new(App::new(
            settings.clone(),
            job_queue.clone(),
            instance_store.clone(),
            caches.clone(),
            provider.clone(),
            migration_scheduler.clone(),
        )));

        Self {
            router: router::init(app_state),
            instance_store,
            job_queue,
            provider,
            migration_scheduler,
            caches,
            settings,
            mock_server,
        }
    }

    pub fn workflow_ctx(&self) -> gpu_orchestrator::workflows::WorkflowContext {
        gpu_orchestrator::workflows::WorkflowContext {
            instance_store: self.instance_store.clone(),
            provider: self.provider.clone(),
            caches: self.caches.clone(),
            job_queue: self.job_queue.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// A `TestHarness` bound to a real TCP listener and served in the
/// background, for tests that need to exercise the HTTP stack itself
/// (timeouts, request id propagation) rather than routing in-process.
pub struct TestApp {
    pub address: String,
}

impl TestApp {
    pub async fn new() -> (Self, TestHarness) {
        let harness = TestHarness::new().await;
        let router = harness.router.clone();

        let listener =
            axum_test::util::new_random_tokio_tcp_listener().expect("failed to bind to random port");
        let port = listener.local_addr().expect("failed to read local address").port();

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server failed");
        });

        (
            Self {
                address: format!("http://localhost:{port}"),
            },
            harness,
        )
    }
}
