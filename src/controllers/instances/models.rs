use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::instance::{BillingMode, HealthCheckState, InstanceState, InstanceStatus, LastError, PortMapping};
use crate::domain::job::HealthCheckConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub name: String,
    pub product_name: String,
    pub template_id: String,
    pub preferred_region: Option<String>,
    pub region_priority_list: Option<Vec<String>>,
    #[serde(default = "default_gpu_num")]
    pub gpu_num: u32,
    #[serde(default = "default_rootfs_size")]
    pub rootfs_size: u32,
    #[serde(default)]
    pub billing_mode: BillingMode,
    pub webhook_url: Option<String>,
    pub max_wait_time_ms: Option<u64>,
    pub health_check_config: Option<HealthCheckConfig>,
}

fn default_gpu_num() -> u32 {
    1
}
fn default_rootfs_size() -> u32 {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceResponse {
    pub instance_id: String,
    pub status: InstanceStatus,
    pub estimated_ready_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub id: String,
    pub provider_instance_id: Option<String>,
    pub name: String,
    pub product_name: String,
    pub template_id: String,
    pub region: String,
    pub gpu_num: u32,
    pub rootfs_size: u32,
    pub billing_mode: BillingMode,
    pub status: InstanceStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub health_check: Option<HealthCheckState>,
    pub port_mappings: Option<Vec<PortMapping>>,
    pub last_error: Option<LastError>,
}

impl From<InstanceState> for InstanceView {
    fn from(s: InstanceState) -> Self {
        Self {
            id: s.id,
            provider_instance_id: s.provider_instance_id,
            name: s.name,
            product_name: s.product_name,
            template_id: s.template_id,
            region: s.region,
            gpu_num: s.gpu_num,
            rootfs_size: s.rootfs_size,
            billing_mode: s.billing_mode,
            status: s.status,
            created_at: s.timestamps.created_at,
            started_at: s.timestamps.started_at,
            ready_at: s.timestamps.ready_at,
            stopped_at: s.timestamps.stopped_at,
            terminated_at: s.timestamps.terminated_at,
            last_synced_at: s.timestamps.last_synced_at,
            health_check: s.health_check,
            port_mappings: s.port_mappings,
            last_error: s.last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListInstancesQuery {
    pub status: Option<InstanceStatus>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct InstanceListResponse {
    pub instances: Vec<InstanceView>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub instance_id: String,
    pub status: InstanceStatus,
}
