use axum::routing::{get, post};
use axum::Router;

use crate::controllers::instances::handlers::*;
use crate::domain::app_state::AppState;

/// Spec §6 `/api/instances/*`.
pub fn instances_routes() -> Router<AppState> {
    Router::new().nest(
        "/api/instances",
        Router::new()
            .route("/", get(list_instances).post(create_instance))
            .route("/{id}", get(get_instance).delete(delete_instance))
            .route("/{id}/start", post(start_instance))
            .route("/{id}/stop", post(stop_instance)),
    )
}
