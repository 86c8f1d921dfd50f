//! Process wiring: builds every subsystem, starts background tasks, and
//! serves HTTP until a shutdown signal arrives.
//!
//! Grounded on the teacher's `startup::launch`/`shutdown_signal`: a
//! `CancellationToken` threaded through every background task, Ctrl+C/
//! SIGTERM/SIGINT racing it, and `axum::serve(..).with_graceful_shutdown`
//! tying the HTTP server's lifetime to the same token.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::registry::{run_daily_clear, CacheRegistry};
use crate::configuration::Settings;
use crate::domain::app_state::{App, AppState};
use crate::domain::error::Result;
use crate::instance_store::InstanceStore;
use crate::job_queue::worker_pool::WorkerPool;
use crate::job_queue::JobQueue;
use crate::migration_scheduler::{run_scheduler, MigrationSchedulerHandle};
use crate::net::server;
use crate::provider::client::ProviderClient;
use crate::provider::service::ProviderService;
use crate::workflows::{register_handlers, WorkflowContext};

/// Builds every subsystem, starts the worker pool and both recurring
/// background tasks, then serves HTTP until shutdown.
pub async fn launch(settings: Settings) -> Result<()> {
    let settings = Arc::new(settings);
    let token = CancellationToken::new();

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

    let ctx = WorkflowContext {
        instance_store,
        provider,
        caches: caches.clone(),
        job_queue: job_queue.clone(),
        settings: settings.clone(),
    };
    let registry = Arc::new(register_handlers(ctx));

    let worker_pool = WorkerPool::new(
        job_queue.clone(),
        registry,
        settings.job_engine.max_concurrent_jobs,
        settings.job_engine.poll_interval(),
        token.clone(),
    );
    let dispatcher = worker_pool.start();

    let cache_clear = tokio::spawn(run_daily_clear(caches, token.clone()));

    let migration_task = if settings.migration.enabled {
        let interval = Duration::from_secs(settings.migration.interval_minutes * 60);
        Some(tokio::spawn(run_scheduler(migration_scheduler, interval, token.clone())))
    } else {
        info!("migration scheduler disabled by configuration");
        None
    };

    let (listener, router) = server::init(app_state).await?;
    info!(addr = %listener.local_addr().expect("listener bound to a socket address"), "listening");

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(token.clone()));

    let result = server.await;

    worker_pool.shutdown(Duration::from_secs(30)).await;
    let _ = cache_clear.await;
    if let Some(handle) = migration_task {
        let _ = handle.await;
    }
    let _ = dispatcher.await;

    result.map_err(|e| {
        warn!(error = %e, "server error while shutting down");
        crate::domain::error::Error::with_detail(
            crate::domain::error::ErrorKind::Internal,
            "server error",
            e.to_string(),
        )
    })
}

/// Waits for Ctrl+C or, on Unix, SIGTERM/SIGINT, then cancels `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => token.cancel(),
        _ = terminate => token.cancel(),
    }

    info!("shutting down");
}
