//! taskdesk Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the
//! batch endpoint.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, TaskdeskMetrics, METRICS};
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
