//! Background worker for the tournament engine.
//!
//! Runs the timeout sweep against PostgreSQL on a fixed interval, exporting
//! Prometheus metrics for every run.

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{CliOverrides, ConfigError, WorkerConfig};
