//! Tracks an in-flight start attempt (spec §3 StartupOperation, §4.8.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::instance::{InstanceId, ProviderInstanceId};

pub type OperationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupStatus {
    Initiated,
    Monitoring,
    HealthChecking,
    Completed,
    Failed,
}

impl StartupStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StartupStatus::Completed | StartupStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartupPhase {
    StartRequested,
    Monitoring,
    HealthChecking,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupOperation {
    pub operation_id: OperationId,
    pub instance_id: InstanceId,
    pub provider_instance_id: Option<ProviderInstanceId>,
    pub status: StartupStatus,
    pub phase: StartupPhase,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub phase_timestamps: HashMap<String, DateTime<Utc>>,
    pub error: Option<String>,
}

impl StartupOperation {
    pub fn new(operation_id: OperationId, instance_id: InstanceId) -> Self {
        let now = Utc::now();
        let mut phase_timestamps = HashMap::new();
        phase_timestamps.insert("startRequested".to_string(), now);
        Self {
            operation_id,
            instance_id,
            provider_instance_id: None,
            status: StartupStatus::Initiated,
            phase: StartupPhase::StartRequested,
            started_at: now,
            phase_timestamps,
            error: None,
        }
    }
}
