//! Provider wire protocol DTOs (spec §6, consumed side).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInstance {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub port_mappings: Option<Vec<crate::domain::instance::PortMapping>>,
    pub spot_status: Option<String>,
    pub spot_reclaim_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceSpec {
    pub name: String,
    pub product_id: String,
    pub region: String,
    pub template_id: String,
    pub gpu_num: u32,
    pub rootfs_size: u32,
    pub image_url: String,
    pub image_auth: Option<ImageAuth>,
    #[serde(default)]
    pub envs: Vec<crate::domain::product::EnvVar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceAck {
    pub id: String,
    pub initial_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductFilter {
    pub product_name: String,
    pub region: String,
}
