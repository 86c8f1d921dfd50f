//! Job Engine's unit of work (spec §3 Job, §4.1).
//!
//! Grounded on the teacher's `domain::job`/`domain::jobs` (diesel-backed
//! `Job`/`JobType`/`JobStatus`) and `game::modifiers::modifier_scheduler`'s
//! `ModifierJobPayload` enum, generalized away from Postgres custom enum
//! types to plain in-memory types dispatched through the job queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::instance::{BillingMode, InstanceId, ProviderInstanceId};
use super::startup_operation::OperationId;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Dispatch priority. Lower numeric value sorts first (mirrors the
/// teacher's `JobPriority` encoding, extended with the spec's own ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    High = 0,
    Normal = 50,
    Low = 100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    CreateInstance,
    MonitorInstance,
    StartInstance,
    MonitorStartup,
    SendWebhook,
    MigrateInstance,
}

/// Health-check parameters threaded through MONITOR_INSTANCE and
/// MONITOR_STARTUP payloads (spec §4.7's `config` argument).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub target_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstancePayload {
    pub instance_id: InstanceId,
    pub name: String,
    pub product_name: String,
    pub template_id: String,
    pub preferred_region: Option<String>,
    pub region_priority_list: Option<Vec<String>>,
    pub gpu_num: u32,
    pub rootfs_size: u32,
    pub billing_mode: BillingMode,
    pub webhook_url: Option<String>,
    pub max_wait_time_ms: u64,
    pub health_check_config: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorInstancePayload {
    pub instance_id: InstanceId,
    pub provider_instance_id: ProviderInstanceId,
    pub webhook_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub max_wait_time_ms: u64,
    pub health_check_config: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstancePayload {
    pub instance_id: InstanceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStartupPayload {
    pub instance_id: InstanceId,
    pub operation_id: OperationId,
    pub provider_instance_id: ProviderInstanceId,
    pub webhook_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub max_wait_time_ms: u64,
    pub health_check_config: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendWebhookPayload {
    pub url: String,
    pub event: String,
    pub instance_id: InstanceId,
    pub status: String,
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateInstancePayload {
    pub instance_id: InstanceId,
    pub reason: String,
}

/// The tagged union spec §9 asks for: job payloads discriminated by
/// `JobType`, one variant per type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobPayload {
    CreateInstance(CreateInstancePayload),
    MonitorInstance(MonitorInstancePayload),
    StartInstance(StartInstancePayload),
    MonitorStartup(MonitorStartupPayload),
    SendWebhook(SendWebhookPayload),
    MigrateInstance(MigrateInstancePayload),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::CreateInstance(_) => JobType::CreateInstance,
            JobPayload::MonitorInstance(_) => JobType::MonitorInstance,
            JobPayload::StartInstance(_) => JobType::StartInstance,
            JobPayload::MonitorStartup(_) => JobType::MonitorStartup,
            JobPayload::SendWebhook(_) => JobType::SendWebhook,
            JobPayload::MigrateInstance(_) => JobType::MigrateInstance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error: Option<JobError>,
}

impl Job {
    pub fn new(payload: JobPayload, priority: JobPriority, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            status: JobStatus::Pending,
            priority,
            attempts: 0,
            max_attempts,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            next_retry_at: None,
            error: None,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// Eligibility predicate from spec §3: pending and due.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.next_retry_at.is_none_or(|at| at <= now)
    }
}
