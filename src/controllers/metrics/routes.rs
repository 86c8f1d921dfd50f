use axum::routing::get;
use axum::Router;

use crate::controllers::metrics::handlers::*;
use crate::domain::app_state::AppState;

/// Spec §6 `GET /api/metrics`.
pub fn metrics_routes() -> Router<AppState> {
    Router::new().nest("/api", Router::new().route("/metrics", get(metrics)))
}
