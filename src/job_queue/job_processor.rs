//! Per-type job handler registration (spec §4.1 `registerHandler`).
//!
//! The spec leaves "per-type handler" abstract; this renders it as a
//! `JobHandler` trait (one async method) keyed by `JobType` in a registry,
//! the idiomatic-Rust analogue of the teacher's `JobProcessor` trait
//! (`fn new`, `async fn run`, `async fn process_job`) — collapsed to a
//! single dispatch method since bounded concurrency here is owned by one
//! shared `WorkerPool` rather than per-type worker fleets.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::error::Error;
use crate::domain::job::{JobPayload, JobType};

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &JobPayload) -> Result<(), Error>;

    /// Per-type timeout (spec §4.1 Timeout). Defaults to two minutes.
    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(120)
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }
}
