mod handlers;
mod models;
mod routes;

pub use routes::instances_routes;
