//! Bounded-concurrency dispatcher (spec §4.1 Scheduling/Shutdown).
//!
//! Grounded on the teacher's `job_queue::worker_pool::WorkerPool`: a
//! `CancellationToken`-driven loop that `tokio::select!`s between a signal
//! and its own tick, with a bounded 30s wait on shutdown before giving up on
//! stragglers — generalized here to one shared dispatcher bounded by a
//! `Semaphore` (spec's `MAX_CONCURRENT_JOBS`) rather than the teacher's
//! fixed per-type worker fleet, since this system's jobs are heterogeneous
//! in duration and type.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::job_processor::HandlerRegistry;
use super::JobQueue;
use crate::domain::job::JobId;

pub struct WorkerPool {
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    poll_interval: Duration,
    cancellation_token: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: Arc<HandlerRegistry>,
        max_concurrent_jobs: usize,
        poll_interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            queue,
            registry,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            poll_interval,
            cancellation_token,
        }
    }

    /// Spawns the dispatcher tick loop. Returns immediately; the loop runs
    /// until the pool's cancellation token fires.
    #[instrument(skip(self))]
    pub fn start(&self) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let registry = self.registry.clone();
        let semaphore = self.semaphore.clone();
        let poll_interval = self.poll_interval;
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("dispatcher shutting down");
                        return;
                    }
                    _ = interval.tick() => {
                        dispatch_eligible(&queue, &registry, &semaphore, &token).await;
                    }
                }
            }
        })
    }

    /// `stop()` + `shutdown(timeout)`: cancel new dispatches, wait up to
    /// `timeout` for in-flight jobs to finish, then fail the rest with
    /// cause `SHUTDOWN`.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancellation_token.cancel();
        // Acquiring every permit proves no job is mid-flight.
        let drain = self.semaphore.acquire_many(self.max_concurrent_jobs as u32);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out waiting for in-flight jobs");
            self.queue.fail_all_processing_as_shutdown();
        }
    }
}

#[instrument(skip(queue, registry, semaphore, token))]
async fn dispatch_eligible(
    queue: &Arc<JobQueue>,
    registry: &Arc<HandlerRegistry>,
    semaphore: &Arc<Semaphore>,
    token: &CancellationToken,
) {
    loop {
        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            return;
        };
        let Some(job) = queue.claim_next_eligible() else {
            drop(permit);
            return;
        };

        let queue = queue.clone();
        let registry = registry.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let _permit = permit;
            run_job(queue, registry, job.id, token).await;
        });
    }
}

#[instrument(skip(queue, registry, token), fields(job_id = %job_id))]
async fn run_job(
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    job_id: JobId,
    token: CancellationToken,
) {
    let Some(job) = queue.get_job(job_id) else {
        return;
    };
    let Some(handler) = registry.get(job.job_type()) else {
        error!(job_type = ?job.job_type(), "no handler registered for job type");
        queue.fail_job(
            job_id,
            &crate::domain::error::Error::new(
                crate::domain::error::ErrorKind::Internal,
                "no handler registered for job type",
            ),
        );
        return;
    };

    let handling = handler.handle(&job.payload);
    tokio::select! {
        _ = token.cancelled() => {
            debug!("job abandoned mid-flight due to shutdown");
        }
        result = tokio::time::timeout(handler.timeout(), handling) => {
            match result {
                Ok(Ok(())) => queue.complete_job(job_id),
                Ok(Err(err)) => queue.fail_job(job_id, &err),
                Err(_) => queue.fail_job(
                    job_id,
                    &crate::domain::error::Error::new(
                        crate::domain::error::ErrorKind::JobTimeout,
                        "job handler timed out",
                    ),
                ),
            }
        }
    }
}
