//! Constants for Trove API
//!
//! Defaults for every environment variable the server reads, plus a few
//! fixed wire strings.

// ============================================================================
// DATABASE
// ============================================================================

/// Default database host list
pub const DEFAULT_DB_HOSTS: &str = "127.0.0.1";

/// Default database port
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default namespace (PostgreSQL schema) holding every Trove table
pub const DEFAULT_DB_NAMESPACE: &str = "trove";

/// Default database name
pub const DEFAULT_DB_NAME: &str = "trove";

/// Default database user
pub const DEFAULT_DB_USER: &str = "postgres";

/// Default maximum pool size
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Default connect and pool-wait timeout in seconds
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// LEASES
// ============================================================================

/// Default lease table name
pub const DEFAULT_LEASE_TABLE: &str = "user_locks";

/// Default interval between local lease-cache sweeps in seconds
pub const DEFAULT_LEASE_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// SCHEMA
// ============================================================================

/// Default latest schema version stamped on saves
pub const DEFAULT_SCHEMA_LATEST_VERSION: &str = "v1";

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host for both listeners
pub const DEFAULT_SERVER_BIND: &str = "0.0.0.0";

/// Default gRPC port
pub const DEFAULT_GRPC_PORT: u16 = 9090;

/// Default health/metrics HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 9091;

// ============================================================================
// WIRE MESSAGES
// ============================================================================

/// Reported when a data request carries no lock reference
pub const LOCK_INFO_MISSING: &str = "lock info missing";

/// Reported when a lease duration would push expiry past the representable range
pub const LEASE_DURATION_OUT_OF_RANGE: &str = "lease_duration_ms out of range";
