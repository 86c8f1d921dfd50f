use axum::debug_handler;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::instrument;

use crate::controllers::migration::models::{MigrationHistoryBody, MigrationRunRecord, MigrationStatusBody};
use crate::domain::app_state::{AppMigrationScheduler, AppState};

#[debug_handler(state = AppState)]
pub(super) async fn status(State(scheduler): State<AppMigrationScheduler>) -> impl IntoResponse {
    Json(MigrationStatusBody {
        running: scheduler.is_running(),
    })
}

#[instrument(skip(scheduler))]
#[debug_handler(state = AppState)]
pub(super) async fn trigger(
    State(scheduler): State<AppMigrationScheduler>,
) -> crate::domain::error::Result<impl IntoResponse> {
    let record = scheduler.run_once().await?;
    Ok(Json(MigrationRunRecord::from(record)))
}

#[debug_handler(state = AppState)]
pub(super) async fn history(State(scheduler): State<AppMigrationScheduler>) -> impl IntoResponse {
    let runs = scheduler.history().into_iter().map(MigrationRunRecord::from).collect();
    Json(MigrationHistoryBody { runs })
}
