// Core modules
pub mod cli;
pub mod configuration;
pub mod errors;
pub mod telemetry;

// Domain-specific modules
pub mod cluster;
pub mod ops;
pub mod types;

/// Name used for created objects, annotations and log records.
pub const APP_NAME: &str = "ktoolhu";
