//! gRPC Service Implementation
//!
//! Adapts proto/trove.proto onto [`TroveService`]. Every handler answers
//! `Ok(Response)`: failures travel in-band as `success = false` plus an
//! `error_message`, so clients never see a transport error for a
//! rejected lease or a broken backend.

use std::time::Instant;

use tonic::{Request, Response, Status};
use trove_core::{LeaseRef, Timestamp, TroveError};

use crate::constants::LOCK_INFO_MISSING;
use crate::service::TroveService;
use crate::telemetry::METRICS;

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("trove");
}

use proto::trove_service_server::TroveServiceServer;
use proto::*;

fn millis(ts: Option<Timestamp>) -> i64 {
    ts.map(|ts| ts.timestamp_millis()).unwrap_or_default()
}

fn lease_ref(lock: Option<LockInfo>) -> Option<LeaseRef> {
    lock.map(|lock| LeaseRef::new(lock.subject_id, lock.owner_id))
}

/// Log a failed call at a level matching its cause and render the message
/// returned to the client.
fn failure(rpc: &'static str, err: &TroveError) -> String {
    let kind = err.kind();
    if kind.is_business_failure() {
        tracing::debug!(rpc, kind = kind.as_str(), error = %err, "Request rejected");
    } else {
        tracing::error!(rpc, kind = kind.as_str(), error = %err, "Request failed");
    }
    err.to_string()
}

fn record(rpc: &'static str, start: Instant, success: bool) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_rpc(rpc, success, start.elapsed().as_secs_f64());
    }
}

/// tonic adapter over [`TroveService`].
#[derive(Clone)]
pub struct TroveServiceImpl {
    service: TroveService,
}

impl TroveServiceImpl {
    pub fn new(service: TroveService) -> Self {
        Self { service }
    }

    /// Wrap in the generated tonic server type.
    pub fn into_server(self) -> TroveServiceServer<Self> {
        TroveServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl trove_service_server::TroveService for TroveServiceImpl {
    async fn claim_lock(
        &self,
        request: Request<ClaimLockRequest>,
    ) -> Result<Response<ClaimLockResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let response = match self
            .service
            .claim_lock(&req.subject_id, &req.owner_id, req.lease_duration_ms)
            .await
        {
            Ok(claim) => ClaimLockResponse {
                success: true,
                error_message: String::new(),
                expires_at_ms: millis(claim.expires_at),
            },
            Err(e) => ClaimLockResponse {
                success: false,
                error_message: failure("ClaimLock", &e),
                expires_at_ms: 0,
            },
        };

        record("ClaimLock", start, response.success);
        Ok(Response::new(response))
    }

    async fn release_lock(
        &self,
        request: Request<ReleaseLockRequest>,
    ) -> Result<Response<ReleaseLockResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let response = match self.service.release_lock(&req.subject_id, &req.owner_id).await {
            Ok(()) => ReleaseLockResponse {
                success: true,
                error_message: String::new(),
            },
            Err(e) => ReleaseLockResponse {
                success: false,
                error_message: failure("ReleaseLock", &e),
            },
        };

        record("ReleaseLock", start, response.success);
        Ok(Response::new(response))
    }

    async fn lock_status(
        &self,
        request: Request<LockStatusRequest>,
    ) -> Result<Response<LockStatusResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let response = match self.service.lock_status(&req.subject_id).await {
            Ok(status) => LockStatusResponse {
                success: true,
                error_message: String::new(),
                held: status.held,
                owner_id: status.owner_id.unwrap_or_default(),
                expires_at_ms: millis(status.expires_at),
            },
            Err(e) => LockStatusResponse {
                success: false,
                error_message: failure("LockStatus", &e),
                ..Default::default()
            },
        };

        record("LockStatus", start, response.success);
        Ok(Response::new(response))
    }

    async fn save(&self, request: Request<SaveRequest>) -> Result<Response<SaveResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let Some(lease) = lease_ref(req.lock) else {
            record("Save", start, false);
            return Ok(Response::new(SaveResponse {
                success: false,
                error_message: LOCK_INFO_MISSING.to_string(),
            }));
        };

        let response = match self
            .service
            .save(&lease, &req.table, req.super_keys, req.column_data)
            .await
        {
            Ok(()) => SaveResponse {
                success: true,
                error_message: String::new(),
            },
            Err(e) => SaveResponse {
                success: false,
                error_message: failure("Save", &e),
            },
        };

        record("Save", start, response.success);
        Ok(Response::new(response))
    }

    async fn load(&self, request: Request<LoadRequest>) -> Result<Response<LoadResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let Some(lease) = lease_ref(req.lock) else {
            record("Load", start, false);
            return Ok(Response::new(LoadResponse {
                success: false,
                error_message: LOCK_INFO_MISSING.to_string(),
                ..Default::default()
            }));
        };

        let response = match self
            .service
            .load(&lease, &req.table, req.super_keys, req.columns)
            .await
        {
            Ok(columns) => LoadResponse {
                success: true,
                error_message: String::new(),
                column_data: columns
                    .into_iter()
                    .map(|(name, value)| (name.into_string(), value))
                    .collect(),
            },
            Err(e) => LoadResponse {
                success: false,
                error_message: failure("Load", &e),
                ..Default::default()
            },
        };

        record("Load", start, response.success);
        Ok(Response::new(response))
    }

    async fn exists(
        &self,
        request: Request<ExistsRequest>,
    ) -> Result<Response<ExistsResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let Some(lease) = lease_ref(req.lock) else {
            record("Exists", start, false);
            return Ok(Response::new(ExistsResponse {
                success: false,
                error_message: LOCK_INFO_MISSING.to_string(),
                exists: false,
            }));
        };

        let response = match self.service.exists(&lease, &req.table, req.super_keys).await {
            Ok(exists) => ExistsResponse {
                success: true,
                error_message: String::new(),
                exists,
            },
            Err(e) => ExistsResponse {
                success: false,
                error_message: failure("Exists", &e),
                exists: false,
            },
        };

        record("Exists", start, response.success);
        Ok(Response::new(response))
    }
}
