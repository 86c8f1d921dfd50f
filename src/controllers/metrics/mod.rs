mod handlers;
mod models;
mod routes;

pub use routes::metrics_routes;
