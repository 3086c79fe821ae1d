//! Metrics and observability
//!
//! Per-relay atomic counters, process-wide totals, the `/stats` JSON API
//! and an optional Prometheus exporter.

mod api;
mod counters;
mod exporter;

pub use api::start_api_server;
pub use counters::*;
pub use exporter::init_metrics;
