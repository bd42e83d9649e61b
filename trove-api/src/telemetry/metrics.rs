//! Prometheus Metrics Definitions
//!
//! All Trove metrics, registered with the default registry and exposed on
//! the sidecar's /metrics endpoint.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// RPC latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const RPC_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Storage operation latency buckets (seconds)
const STORAGE_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Global metrics instance - initialized on first use
pub static METRICS: Lazy<ApiResult<TroveMetrics>> = Lazy::new(TroveMetrics::new);

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Container for all Trove metrics.
#[derive(Clone)]
pub struct TroveMetrics {
    /// RPC counter - labels: rpc, status
    pub rpc_requests_total: CounterVec,

    /// RPC duration histogram - labels: rpc
    pub rpc_duration_seconds: HistogramVec,

    /// Lease claim counter - labels: outcome
    pub lease_claims_total: CounterVec,

    /// Storage operation counter - labels: operation, status
    pub storage_operations_total: CounterVec,

    /// Storage operation duration histogram - labels: operation
    pub storage_operation_duration_seconds: HistogramVec,

    /// Migration counter - labels: status
    pub migrations_total: CounterVec,

    /// Entries currently held in the local lease cache
    pub lease_cache_entries: Gauge,
}

impl TroveMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            rpc_requests_total: register_counter_vec!(
                "trove_rpc_requests_total",
                "Total number of gRPC requests",
                &["rpc", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rpc_requests_total: {}", e)))?,

            rpc_duration_seconds: register_histogram_vec!(
                "trove_rpc_duration_seconds",
                "gRPC request duration in seconds",
                &["rpc"],
                RPC_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rpc_duration_seconds: {}", e)))?,

            lease_claims_total: register_counter_vec!(
                "trove_lease_claims_total",
                "Total lease claims by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register lease_claims_total: {}", e)))?,

            storage_operations_total: register_counter_vec!(
                "trove_storage_operations_total",
                "Total number of storage operations",
                &["operation", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register storage_operations_total: {}", e)))?,

            storage_operation_duration_seconds: register_histogram_vec!(
                "trove_storage_operation_duration_seconds",
                "Storage operation duration in seconds",
                &["operation"],
                STORAGE_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register storage_operation_duration_seconds: {}", e))
            })?,

            migrations_total: register_counter_vec!(
                "trove_migrations_total",
                "Total row migrations triggered by loads",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register migrations_total: {}", e)))?,

            lease_cache_entries: register_gauge!(
                "trove_lease_cache_entries",
                "Current number of entries in the local lease cache"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register lease_cache_entries: {}", e)))?,
        })
    }

    /// Record a completed RPC.
    pub fn record_rpc(&self, rpc: &str, success: bool, duration_secs: f64) {
        self.rpc_requests_total
            .with_label_values(&[rpc, status_label(success)])
            .inc();
        self.rpc_duration_seconds
            .with_label_values(&[rpc])
            .observe(duration_secs);
    }

    /// Record a lease claim outcome.
    pub fn record_lease_claim(&self, outcome: &str) {
        self.lease_claims_total.with_label_values(&[outcome]).inc();
    }

    /// Record a storage operation.
    pub fn record_storage_operation(&self, operation: &str, success: bool, duration_secs: f64) {
        self.storage_operations_total
            .with_label_values(&[operation, status_label(success)])
            .inc();
        self.storage_operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Record a load-triggered migration.
    pub fn record_migration(&self, success: bool) {
        self.migrations_total
            .with_label_values(&[status_label(success)])
            .inc();
    }

    pub fn set_lease_cache_entries(&self, count: usize) {
        self.lease_cache_entries.set(count as f64);
    }
}

/// Handler for GET /metrics.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so an idle server still exports every family.
    if let Err(e) = METRICS.as_ref() {
        tracing::error!(error = %e, "Metrics registry unavailable");
    }

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
