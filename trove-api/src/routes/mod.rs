//! HTTP sidecar routes.
//!
//! The data plane is gRPC only; this router carries health probes and the
//! Prometheus scrape endpoint.

use axum::{routing::get, Router};

use crate::service::TroveService;
use crate::telemetry::metrics_handler;

pub mod health;

/// Build the sidecar router: `/health/*` plus `/metrics`.
pub fn create_router(service: TroveService) -> Router {
    Router::new()
        .nest("/health", health::create_router(service))
        .route("/metrics", get(metrics_handler))
}
