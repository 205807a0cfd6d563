pub mod config;
pub mod error;
pub mod polls;
pub mod store;
pub mod telemetry;
