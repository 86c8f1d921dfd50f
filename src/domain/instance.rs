//! Authoritative instance record and its state machine (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub type InstanceId = String;
pub type ProviderInstanceId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum InstanceStatus {
    Creating,
    Created,
    Starting,
    Running,
    HealthChecking,
    Ready,
    Stopping,
    Stopped,
    Failed,
    Terminated,
    Exited,
}

impl InstanceStatus {
    /// The transition table of spec §4.5. Any pair not listed here is rejected.
    pub fn can_transition_to(self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Creating, Created)
                | (Creating, Failed)
                | (Created, Starting)
                | (Created, Failed)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, HealthChecking)
                | (Running, Stopping)
                | (Running, Exited)
                | (Running, Failed)
                | (HealthChecking, Ready)
                | (HealthChecking, Failed)
                | (HealthChecking, Stopping)
                | (Ready, Stopping)
                | (Ready, Exited)
                | (Ready, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
                | (Stopped, Starting)
                | (Stopped, Terminated)
                | (Exited, Starting)
                | (Exited, Terminated)
                | (_, Terminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Terminated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BillingMode {
    #[default]
    OnDemand,
    Spot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Pending,
    InProgress,
    Healthy,
    Partial,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthProbeResult {
    pub port: u16,
    pub status: HealthStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub response_time_ms: Option<u64>,
    pub categorized_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckState {
    pub status: HealthStatus,
    #[serde(default)]
    pub results: Vec<HealthProbeResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Http,
    Https,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub port: u16,
    pub endpoint: String,
    #[serde(rename = "type")]
    pub port_type: PortType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub code: String,
    pub message: String,
    pub phase: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceState {
    pub id: InstanceId,
    pub provider_instance_id: Option<ProviderInstanceId>,
    pub name: String,
    pub product_name: String,
    pub template_id: String,
    pub region: String,
    pub gpu_num: u32,
    pub rootfs_size: u32,
    pub billing_mode: BillingMode,
    pub status: InstanceStatus,
    pub timestamps: Timestamps,
    pub health_check: Option<HealthCheckState>,
    pub port_mappings: Option<Vec<PortMapping>>,
    pub last_error: Option<LastError>,
    pub webhook_url: Option<String>,
    /// Provider-reported spot-reclaim fields, needed by the migration
    /// eligibility predicate (spec §4.8.4). Provider-authoritative, not set
    /// locally except via `syncFromProvider`.
    pub spot_reclaim_time: Option<i64>,
    pub spot_status: Option<String>,
}

impl InstanceState {
    pub fn new(
        id: InstanceId,
        name: String,
        product_name: String,
        template_id: String,
        region: String,
        gpu_num: u32,
        rootfs_size: u32,
        billing_mode: BillingMode,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            id,
            provider_instance_id: None,
            name,
            product_name,
            template_id,
            region,
            gpu_num,
            rootfs_size,
            billing_mode,
            status: InstanceStatus::Creating,
            timestamps: Timestamps {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
            health_check: None,
            port_mappings: None,
            last_error: None,
            webhook_url,
            spot_reclaim_time: None,
            spot_status: None,
        }
    }

    /// Is this instance eligible for the migration scheduler's sweep
    /// (spec §4.8.4)? Computed, never stored.
    pub fn is_migration_eligible(&self) -> bool {
        self.status == InstanceStatus::Exited
            && self.spot_reclaim_time.is_some_and(|t| t != 0)
            && self.spot_status.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_spec() {
        assert!(InstanceStatus::Creating.can_transition_to(InstanceStatus::Created));
        assert!(InstanceStatus::Creating.can_transition_to(InstanceStatus::Failed));
        assert!(!InstanceStatus::Creating.can_transition_to(InstanceStatus::Running));
        assert!(InstanceStatus::Stopped.can_transition_to(InstanceStatus::Starting));
        assert!(InstanceStatus::Stopped.can_transition_to(InstanceStatus::Terminated));
        assert!(!InstanceStatus::Stopped.can_transition_to(InstanceStatus::Ready));
        assert!(InstanceStatus::Exited.can_transition_to(InstanceStatus::Starting));
        assert!(InstanceStatus::Exited.can_transition_to(InstanceStatus::Terminated));
        assert!(InstanceStatus::Running.can_transition_to(InstanceStatus::Terminated));
    }

    #[test]
    fn migration_eligibility_requires_all_three_fields() {
        let mut inst = InstanceState::new(
            "i1".into(),
            "n".into(),
            "p".into(),
            "t".into(),
            "r1".into(),
            1,
            10,
            BillingMode::Spot,
            None,
        );
        inst.status = InstanceStatus::Exited;
        assert!(!inst.is_migration_eligible());
        inst.spot_reclaim_time = Some(1_700_000_000);
        assert!(!inst.is_migration_eligible());
        inst.spot_status = Some("reclaimed".into());
        assert!(inst.is_migration_eligible());
        inst.spot_reclaim_time = Some(0);
        assert!(!inst.is_migration_eligible());
    }
}
