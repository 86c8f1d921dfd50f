//! In-memory priority job queue (spec §3 Job, §4.1).
//!
//! Grounded on the teacher's `job_queue::mod` (`JobQueue` wrapping a pool +
//! `broadcast::Sender<()>` shutdown signal), generalized from a
//! diesel-backed table to a plain in-memory map: spec.md's Non-goals
//! explicitly drop durable job persistence (on restart, in-flight jobs are
//! lost and instance state re-syncs from the Provider).

pub mod job_processor;
pub mod worker_pool;
pub mod retry;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::domain::error::{Error, ErrorKind};
use crate::domain::job::{Job, JobId, JobPayload, JobPriority, JobStatus, JobType};

#[derive(Debug, Default, Clone, Copy)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone)]
pub struct JobListFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
}

pub struct JobQueue {
    jobs: Mutex<HashMap<JobId, Job>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            jobs: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    #[instrument(skip(self, payload))]
    pub fn enqueue(&self, payload: JobPayload, priority: JobPriority, max_attempts: u32) -> JobId {
        let job = Job::new(payload, priority, max_attempts);
        let id = job.id;
        debug!(job_id = %id, job_type = ?job.job_type(), "enqueued job");
        self.jobs.lock().expect("job queue lock poisoned").insert(id, job);
        id
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().expect("job queue lock poisoned").get(&id).cloned()
    }

    pub fn list_jobs(&self, filter: &JobListFilter) -> Vec<Job> {
        self.jobs
            .lock()
            .expect("job queue lock poisoned")
            .values()
            .filter(|job| filter.status.is_none_or(|s| job.status == s))
            .filter(|job| filter.job_type.is_none_or(|t| job.job_type() == t))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> JobStats {
        let jobs = self.jobs.lock().expect("job queue lock poisoned");
        let mut stats = JobStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Pops the highest-priority, earliest-created eligible job and marks it
    /// `processing`. The queue guarantees a job is dispatched at most once
    /// concurrently since this transition is the only path out of `pending`.
    pub fn claim_next_eligible(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        let now = Utc::now();
        let next_id = jobs
            .values()
            .filter(|job| job.is_eligible(now))
            .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.created_at.cmp(&b.created_at)))
            .map(|job| job.id)?;

        let job = jobs.get_mut(&next_id).expect("id just found in the same map");
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.processed_at = Some(now);
        Some(job.clone())
    }

    pub fn complete_job(&self, id: JobId) {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        if let Some(job) = jobs.get_mut(&id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.error = None;
        }
    }

    /// Applies spec §4.1's retry policy: retryable errors with budget
    /// remaining reschedule with backoff; otherwise the job fails terminally.
    #[instrument(skip(self, err))]
    pub fn fail_job(&self, id: JobId, err: &Error) {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        if let Some(job) = jobs.get_mut(&id) {
            job.error = Some(crate::domain::job::JobError {
                code: err.kind().code().to_string(),
                message: err.to_string(),
            });
            if job.attempts < job.max_attempts && err.is_retryable() {
                let delay = retry::next_retry_delay(job.attempts);
                job.next_retry_at = Some(Utc::now() + delay);
                job.status = JobStatus::Pending;
            } else {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
            }
        }
    }

    /// Marks every `processing` job failed with cause `SHUTDOWN`, used by
    /// `shutdown(timeout)` once its grace period elapses.
    pub fn fail_all_processing_as_shutdown(&self) {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        for job in jobs.values_mut() {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error = Some(crate::domain::job::JobError {
                    code: ErrorKind::Shutdown.code().to_string(),
                    message: "job engine shut down before completion".to_string(),
                });
            }
        }
    }

    /// Purges terminal jobs completed/failed before `older_than`.
    pub fn cleanup(&self, older_than: chrono::DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        let before = jobs.len();
        jobs.retain(|_, job| match job.completed_at {
            Some(completed_at) => completed_at > older_than,
            None => true,
        });
        before - jobs.len()
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::StartInstancePayload;

    fn payload() -> JobPayload {
        JobPayload::StartInstance(StartInstancePayload {
            instance_id: "i1".to_string(),
        })
    }

    #[test]
    fn claim_next_eligible_prefers_higher_priority() {
        let queue = JobQueue::new();
        queue.enqueue(payload(), JobPriority::Low, 3);
        let high_id = queue.enqueue(payload(), JobPriority::High, 3);
        let claimed = queue.claim_next_eligible().unwrap();
        assert_eq!(claimed.id, high_id);
    }

    #[test]
    fn claim_marks_processing_and_increments_attempts() {
        let queue = JobQueue::new();
        let id = queue.enqueue(payload(), JobPriority::Normal, 3);
        let claimed = queue.claim_next_eligible().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(queue.claim_next_eligible().is_none());
    }

    #[test]
    fn fail_job_reschedules_when_retryable_and_budget_remains() {
        let queue = JobQueue::new();
        let id = queue.enqueue(payload(), JobPriority::Normal, 3);
        queue.claim_next_eligible();
        queue.fail_job(id, &Error::new(ErrorKind::NetworkError, "boom"));
        let job = queue.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.next_retry_at.is_some());
    }

    #[test]
    fn fail_job_terminal_when_budget_exhausted() {
        let queue = JobQueue::new();
        let id = queue.enqueue(payload(), JobPriority::Normal, 1);
        queue.claim_next_eligible();
        queue.fail_job(id, &Error::new(ErrorKind::NetworkError, "boom"));
        let job = queue.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn fail_job_terminal_when_not_retryable() {
        let queue = JobQueue::new();
        let id = queue.enqueue(payload(), JobPriority::Normal, 5);
        queue.claim_next_eligible();
        queue.fail_job(id, &Error::new(ErrorKind::Validation, "bad input"));
        let job = queue.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }
}
