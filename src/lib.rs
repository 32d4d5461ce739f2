/// Library crate entry point.
/// Exposes internal modules for integration tests.
/// Production binary uses src/main.rs.

pub mod config;
pub mod error;
pub mod filters;
pub mod metrics;
