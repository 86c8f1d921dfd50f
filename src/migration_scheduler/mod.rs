//! Cron-style scan for reclaimed spot instances (spec §4.9).
//!
//! Grounded on the teacher's `*_scheduler` structs (e.g.
//! `game::modifiers::modifier_scheduler::ModifierScheduler`): a thin struct
//! holding an `Arc<JobQueue>` and enqueuing jobs on a timer, here driven by
//! a `tokio::time::interval` loop racing a `CancellationToken` per the
//! teacher's `WorkerPool` shutdown idiom.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::error::{Error, ErrorKind};
use crate::domain::instance::InstanceState;
use crate::domain::job::{JobPriority, JobType, MigrateInstancePayload};
use crate::instance_store::{InstanceStore, ListFilter};
use crate::job_queue::JobQueue;
use crate::provider::service::ProviderService;

const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub eligible_count: usize,
    pub enqueued_count: usize,
    pub dry_run: bool,
    pub errors: Vec<String>,
}

struct Locked {
    running: bool,
    history: VecDeque<RunRecord>,
}

/// Shared handle the REST surface uses to trigger/inspect the scheduler
/// (spec §6 `/api/migration/*`).
pub struct MigrationSchedulerHandle {
    job_queue: Arc<JobQueue>,
    instance_store: Arc<InstanceStore>,
    provider: Arc<ProviderService>,
    max_concurrent: usize,
    dry_run: bool,
    locked: Mutex<Locked>,
}

impl MigrationSchedulerHandle {
    pub fn new(
        job_queue: Arc<JobQueue>,
        instance_store: Arc<InstanceStore>,
        provider: Arc<ProviderService>,
        max_concurrent: usize,
        dry_run: bool,
    ) -> Self {
        Self {
            job_queue,
            instance_store,
            provider,
            max_concurrent,
            dry_run,
            locked: Mutex::new(Locked {
                running: false,
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            }),
        }
    }

    pub fn history(&self) -> Vec<RunRecord> {
        self.locked
            .lock()
            .expect("migration scheduler lock poisoned")
            .history
            .iter()
            .cloned()
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RunRecord, Error> {
        {
            let mut locked = self.locked.lock().expect("migration scheduler lock poisoned");
            if locked.running {
                return Err(Error::new(
                    ErrorKind::MigrationJobConflict,
                    "a migration scan is already in progress",
                ));
            }
            locked.running = true;
        }

        let started_at = Utc::now();
        let request_id = format!("migration-scan-{started_at}");
        let mut errors = Vec::new();

        self.instance_store
            .sync_from_provider(&self.provider, &request_id)
            .await;

        let eligible: Vec<InstanceState> = self
            .instance_store
            .list(&ListFilter::default())
            .into_iter()
            .filter(InstanceState::is_migration_eligible)
            .collect();

        let mut enqueued_count = 0;
        if self.dry_run {
            info!(count = eligible.len(), "dry run: eligible instances found, no jobs enqueued");
        } else {
            for instance in eligible.iter().take(self.max_concurrent) {
                self.job_queue.enqueue(
                    crate::domain::job::JobPayload::MigrateInstance(MigrateInstancePayload {
                        instance_id: instance.id.clone(),
                        reason: "spot_reclaim".to_string(),
                    }),
                    JobPriority::Normal,
                    3,
                );
                enqueued_count += 1;
            }
            if eligible.len() > self.max_concurrent {
                warn!(
                    dropped = eligible.len() - self.max_concurrent,
                    "more eligible instances than MIGRATION_MAX_CONCURRENT allows this tick"
                );
                errors.push(format!(
                    "{} eligible instances deferred to next tick (concurrency bound {})",
                    eligible.len() - self.max_concurrent,
                    self.max_concurrent
                ));
            }
        }

        let record = RunRecord {
            started_at,
            completed_at: Utc::now(),
            eligible_count: eligible.len(),
            enqueued_count,
            dry_run: self.dry_run,
            errors,
        };

        let mut locked = self.locked.lock().expect("migration scheduler lock poisoned");
        locked.running = false;
        if locked.history.len() == HISTORY_CAPACITY {
            locked.history.pop_front();
        }
        locked.history.push_back(record.clone());
        drop(locked);

        Ok(record)
    }

    /// True while a scan (scheduled or manually triggered) is in flight.
    pub fn is_running(&self) -> bool {
        self.locked.lock().expect("migration scheduler lock poisoned").running
    }
}

/// Drives periodic scans at `interval` until `token` is cancelled.
#[instrument(skip(handle, token))]
pub async fn run_scheduler(handle: Arc<MigrationSchedulerHandle>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("migration scheduler shutting down");
                return;
            }
            _ = ticker.tick() => {
                match handle.run_once().await {
                    Ok(record) => info!(
                        eligible = record.eligible_count,
                        enqueued = record.enqueued_count,
                        "migration scan complete"
                    ),
                    Err(err) => warn!(error = %err, "migration scan skipped"),
                }
            }
        }
    }
}

/// Also exposed as `JobType::MigrateInstance`'s job type, for callers that
/// need to filter the job queue for in-flight migrations.
pub const MIGRATION_JOB_TYPE: JobType = JobType::MigrateInstance;
