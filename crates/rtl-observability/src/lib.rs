//! # rtl-observability
//!
//! Logging and metrics infrastructure for the real-time loss tools.
//!
//! This crate provides structured logging with tracing and run metrics recorded
//! through the `metrics` facade, so any exporter installed by the host binary
//! picks them up.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::{MetricsCollector, RunSummary};
