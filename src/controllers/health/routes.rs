use axum::routing::get;
use axum::Router;

use crate::controllers::health::handlers::*;
use crate::domain::app_state::AppState;

/// Spec §6 `GET /health` — liveness plus subsystem health.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check)).route("/health/live", get(liveness_check))
}
