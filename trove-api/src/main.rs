//! Trove Server Entry Point
//!
//! Bootstraps configuration, connects the PostgreSQL pool, and runs the
//! gRPC server and the health/metrics sidecar until Ctrl-C.

use std::sync::Arc;

use tokio::sync::watch;
use trove_api::telemetry::init_tracing;
use trove_api::{
    create_router, lease_sweep_task, ApiError, ApiResult, DbConfig, LeaseCache, LeaseManager,
    LeaseSweepConfig, PgStore, TroveConfig, TroveService, TroveServiceImpl,
};
use trove_core::{MigrationRegistry, SystemClock, VersionGraph};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = TroveConfig::from_env();
    let db_config = DbConfig::from_env()?;
    let store = Arc::new(PgStore::from_config(&db_config)?);

    // The backend may come up after us; readiness reports it until then.
    if let Err(e) = store.ensure_lease_table().await {
        tracing::warn!(error = %e, "Could not ensure lease table exists");
    }

    let leases = LeaseManager::new(store.clone(), LeaseCache::new(), Arc::new(SystemClock));
    // Games register their transforms here; without them every table
    // stamps and expects the configured latest version.
    let migrations = MigrationRegistry::new(VersionGraph::new(config.latest_version.clone()));
    tracing::info!(
        latest_version = %config.latest_version,
        edges = migrations.default_graph().edge_count(),
        "Migration registry ready"
    );
    let service = TroveService::new(store, leases.clone(), migrations);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = tokio::spawn(lease_sweep_task(
        leases,
        LeaseSweepConfig {
            interval: config.sweep_interval,
        },
        shutdown_rx,
    ));

    let grpc_addr = config.grpc_addr()?;
    let http_addr = config.http_addr()?;

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", http_addr, e)))?;

    tracing::info!(%grpc_addr, %http_addr, latest_version = %config.latest_version, "Starting Trove server");

    let http = axum::serve(listener, create_router(service.clone()));
    let grpc = tonic::transport::Server::builder()
        .add_service(TroveServiceImpl::new(service).into_server())
        .serve(grpc_addr);

    let outcome = tokio::select! {
        result = grpc => {
            result.map_err(|e| ApiError::internal_error(format!("gRPC server error: {}", e)))
        }
        result = http => {
            result.map_err(|e| ApiError::internal_error(format!("HTTP server error: {}", e)))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep.await {
        tracing::warn!(error = %e, "Lease sweep task did not stop cleanly");
    }

    outcome
}
