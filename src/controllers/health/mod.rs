mod handlers;
mod models;
mod routes;

pub use routes::health_routes;
