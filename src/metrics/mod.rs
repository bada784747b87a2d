//! Metrics module
//!
//! Prometheus metrics derived from publisher events.

mod exporter;

pub use exporter::{PrometheusEventPublisher, METRIC_PREFIX};
