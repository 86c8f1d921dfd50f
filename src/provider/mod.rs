pub mod circuit_breaker;
pub mod client;
pub mod service;
pub mod types;
