use serde::Serialize;

use crate::cache::CacheMetrics;

#[derive(Debug, Serialize)]
pub struct MetricsBody {
    pub jobs: JobMetrics,
    pub instances: InstanceMetrics,
    pub caches: CacheMetricsBody,
}

#[derive(Debug, Serialize)]
pub struct JobMetrics {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct InstanceMetrics {
    pub total: usize,
    pub ready: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct CacheMetricsBody {
    pub instance_details: CacheMetrics,
    pub instance_states: CacheMetrics,
    pub products: CacheMetrics,
    pub templates: CacheMetrics,
    pub merged_instances: CacheMetrics,
}
