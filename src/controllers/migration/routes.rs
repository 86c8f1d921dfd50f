use axum::routing::{get, post};
use axum::Router;

use crate::controllers::migration::handlers::*;
use crate::domain::app_state::AppState;

/// Spec §6 `/api/migration/{status,trigger,history}`.
pub fn migration_routes() -> Router<AppState> {
    Router::new().nest(
        "/api/migration",
        Router::new()
            .route("/status", get(status))
            .route("/trigger", post(trigger))
            .route("/history", get(history)),
    )
}
