//! Router assembly: middleware stack plus the four controller surfaces.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info_span};

use crate::controllers::{health_routes, instances_routes, metrics_routes, migration_routes};
use crate::domain::app_state::AppState;
use crate::net::request_id::MakeRequestUlid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Builds the full router: request-id tagging, tracing span per request,
/// panic recovery, permissive CORS, a blanket timeout, then every
/// controller surface mounted against `state`.
pub fn init(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUlid))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request.headers().get(REQUEST_ID_HEADER);
            match request_id {
                Some(request_id) => info_span!(
                    "http_request",
                    request_id = ?request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                ),
                None => {
                    error!("could not extract request_id");
                    info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }
            }
        }))
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(PropagateRequestIdLayer::new(x_request_id));

    Router::new()
        .merge(health_routes())
        .merge(instances_routes())
        .merge(metrics_routes())
        .merge(migration_routes())
        .layer(middleware)
        .with_state(state)
}
