//! Trove API - lease-guarded game state service
//!
//! Serves the Trove gRPC service over a PostgreSQL-backed column store,
//! with a small HTTP sidecar for health probes and Prometheus metrics.
//!
//! Requests flow through [`TroveService`], which gates every data call on
//! the local lease cache kept by [`LeaseManager`] and upgrades stale rows
//! through the migration registry on load.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod grpc;
pub mod jobs;
pub mod lease;
pub mod routes;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::TroveConfig;
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use grpc::{proto, TroveServiceImpl};
pub use jobs::{lease_sweep_task, LeaseSweepConfig};
pub use lease::{LeaseCache, LeaseManager};
pub use routes::create_router;
pub use service::TroveService;
