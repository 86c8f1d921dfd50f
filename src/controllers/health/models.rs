use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthCheckBody {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemHealth {
    pub job_queue: JobQueueHealth,
    pub migration_scheduler_running: bool,
}

#[derive(Debug, Serialize)]
pub struct JobQueueHealth {
    pub pending: usize,
    pub processing: usize,
}

#[derive(Debug, Serialize)]
pub struct LivenessBody {
    pub alive: bool,
    pub subsystems: SubsystemHealth,
}
