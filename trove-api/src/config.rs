//! Server Configuration Module
//!
//! Listener addresses, lease sweep cadence and the default schema version.
//! Loaded from environment variables with the defaults in
//! [`crate::constants`]. Database settings live in [`crate::db::DbConfig`].

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use trove_core::SchemaVersion;

use crate::constants::{
    DEFAULT_GRPC_PORT, DEFAULT_HTTP_PORT, DEFAULT_LEASE_SWEEP_INTERVAL_SECS,
    DEFAULT_SCHEMA_LATEST_VERSION, DEFAULT_SERVER_BIND,
};
use crate::error::{ApiError, ApiResult};

/// Read `key` from the environment, falling back to `default` when unset
/// or unparsable. Connection settings pass `warn_on_default` so a server
/// silently pointed at a default database is visible in the logs.
pub(crate) fn env_setting<T>(key: &str, default: T, warn_on_default: bool) -> T
where
    T: FromStr + Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => {
            if warn_on_default {
                tracing::warn!(variable = key, default = %default, "Not set, using default");
            }
            default
        }
    }
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// Settings for the gRPC server, the HTTP sidecar and background jobs.
#[derive(Debug, Clone)]
pub struct TroveConfig {
    /// Bind host for both listeners
    pub bind: String,
    /// gRPC port
    pub grpc_port: u16,
    /// Health/metrics HTTP port
    pub http_port: u16,
    /// Interval between local lease-cache sweeps
    pub sweep_interval: Duration,
    /// Latest schema version for tables without their own migration graph
    pub latest_version: SchemaVersion,
}

impl Default for TroveConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_SERVER_BIND.to_string(),
            grpc_port: DEFAULT_GRPC_PORT,
            http_port: DEFAULT_HTTP_PORT,
            sweep_interval: Duration::from_secs(DEFAULT_LEASE_SWEEP_INTERVAL_SECS),
            latest_version: SchemaVersion::from(DEFAULT_SCHEMA_LATEST_VERSION),
        }
    }
}

impl TroveConfig {
    /// Create a TroveConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TROVE_SERVER_BIND`: bind host (default: 0.0.0.0)
    /// - `TROVE_SERVER_PORT`: gRPC port (default: 9090)
    /// - `TROVE_HTTP_PORT`: health/metrics port (default: 9091)
    /// - `TROVE_LEASE_SWEEP_INTERVAL_SECS`: cache sweep interval (default: 60)
    /// - `TROVE_SCHEMA_LATEST_VERSION`: latest schema version (default: v1)
    pub fn from_env() -> Self {
        let sweep_secs = env_setting(
            "TROVE_LEASE_SWEEP_INTERVAL_SECS",
            DEFAULT_LEASE_SWEEP_INTERVAL_SECS,
            false,
        );

        Self {
            bind: env_setting("TROVE_SERVER_BIND", DEFAULT_SERVER_BIND.to_string(), false),
            grpc_port: env_setting("TROVE_SERVER_PORT", DEFAULT_GRPC_PORT, false),
            http_port: env_setting("TROVE_HTTP_PORT", DEFAULT_HTTP_PORT, false),
            // A zero interval would make tokio's interval panic.
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            latest_version: SchemaVersion::new(env_setting(
                "TROVE_SCHEMA_LATEST_VERSION",
                DEFAULT_SCHEMA_LATEST_VERSION.to_string(),
                false,
            )),
        }
    }

    /// Address the gRPC server listens on.
    pub fn grpc_addr(&self) -> ApiResult<SocketAddr> {
        resolve_addr(&self.bind, self.grpc_port)
    }

    /// Address the health/metrics sidecar listens on.
    pub fn http_addr(&self) -> ApiResult<SocketAddr> {
        resolve_addr(&self.bind, self.http_port)
    }
}

fn resolve_addr(host: &str, port: u16) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
