mod health;
mod instances;
mod metrics;
mod migration;

pub use health::health_routes;
pub use instances::instances_routes;
pub use metrics::metrics_routes;
pub use migration::migration_routes;
