//! Trove Telemetry
//!
//! Structured logging setup and Prometheus metrics for the service.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, TroveMetrics, METRICS};
pub use tracer::init_tracing;
