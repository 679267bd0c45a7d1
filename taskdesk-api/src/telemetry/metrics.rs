//! Prometheus Metrics Definitions
//!
//! Batch and action counters for the agent endpoint, exposed at `/metrics`
//! for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use taskdesk_core::ActionKind;

use crate::error::{ApiError, ApiResult};

/// Batch latency buckets (seconds)
const BATCH_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<TaskdeskMetrics>> = Lazy::new(TaskdeskMetrics::new);

/// Container for all taskdesk metrics.
#[derive(Clone)]
pub struct TaskdeskMetrics {
    /// Batches handled - labels: outcome
    pub batches_total: CounterVec,

    /// Actions applied or previewed - labels: kind, mode
    pub actions_total: CounterVec,

    /// Batch duration histogram - labels: mode
    pub batch_duration_seconds: HistogramVec,
}

impl TaskdeskMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            batches_total: register_counter_vec!(
                "taskdesk_batches_total",
                "Total number of agent batches by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register batches_total: {}", e)))?,

            actions_total: register_counter_vec!(
                "taskdesk_actions_total",
                "Total number of agent actions by kind and mode",
                &["kind", "mode"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register actions_total: {}", e)))?,

            batch_duration_seconds: register_histogram_vec!(
                "taskdesk_batch_duration_seconds",
                "Agent batch duration in seconds",
                &["mode"],
                BATCH_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register batch_duration_seconds: {}", e))
            })?,
        })
    }

    /// Record a finished batch.
    ///
    /// `outcome` is one of `committed`, `preview`, `replayed`, `conflict`,
    /// `rejected` or `failed`.
    pub fn record_batch(&self, outcome: &str, dry_run: bool, duration_secs: f64) {
        self.batches_total.with_label_values(&[outcome]).inc();
        self.batch_duration_seconds
            .with_label_values(&[mode(dry_run)])
            .observe(duration_secs);
    }

    /// Count the actions of a successful batch.
    pub fn record_actions<I>(&self, kinds: I, dry_run: bool)
    where
        I: IntoIterator<Item = ActionKind>,
    {
        for kind in kinds {
            self.actions_total
                .with_label_values(&[kind.as_str(), mode(dry_run)])
                .inc();
        }
    }
}

fn mode(dry_run: bool) -> &'static str {
    if dry_run {
        "dry_run"
    } else {
        "real"
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
