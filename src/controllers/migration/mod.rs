mod handlers;
mod models;
mod routes;

pub use routes::migration_routes;
