use axum::debug_handler;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::controllers::metrics::models::{CacheMetricsBody, InstanceMetrics, JobMetrics, MetricsBody};
use crate::domain::app_state::{AppCaches, AppQueue, AppState, AppStore};
use crate::domain::instance::InstanceStatus;
use crate::instance_store::ListFilter;

#[debug_handler(state = AppState)]
pub(super) async fn metrics(
    State(queue): State<AppQueue>,
    State(store): State<AppStore>,
    State(caches): State<AppCaches>,
) -> impl IntoResponse {
    let job_stats = queue.stats();
    let instances = store.list(&ListFilter::default());
    let instance_metrics = InstanceMetrics {
        total: instances.len(),
        ready: instances.iter().filter(|i| i.status == InstanceStatus::Ready).count(),
        failed: instances.iter().filter(|i| i.status == InstanceStatus::Failed).count(),
    };

    Json(MetricsBody {
        jobs: JobMetrics {
            pending: job_stats.pending,
            processing: job_stats.processing,
            completed: job_stats.completed,
            failed: job_stats.failed,
        },
        instances: instance_metrics,
        caches: CacheMetricsBody {
            instance_details: caches.instance_details.stats(),
            instance_states: caches.instance_states.stats(),
            products: caches.products.stats(),
            templates: caches.templates.stats(),
            merged_instances: caches.merged_instances.stats(),
        },
    })
}
