use axum::debug_handler;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::controllers::health::models::{HealthCheckBody, JobQueueHealth, LivenessBody, SubsystemHealth};
use crate::domain::app_state::{AppMigrationScheduler, AppQueue, AppState};

#[debug_handler]
pub(super) async fn health_check() -> impl IntoResponse {
    Json(HealthCheckBody {
        status: "OK",
        timestamp: chrono::Utc::now(),
    })
}

#[debug_handler(state = AppState)]
pub(super) async fn liveness_check(
    State(queue): State<AppQueue>,
    State(migration_scheduler): State<AppMigrationScheduler>,
) -> impl IntoResponse {
    let stats = queue.stats();
    Json(LivenessBody {
        alive: true,
        subsystems: SubsystemHealth {
            job_queue: JobQueueHealth {
                pending: stats.pending,
                processing: stats.processing,
            },
            migration_scheduler_running: migration_scheduler.is_running(),
        },
    })
}
