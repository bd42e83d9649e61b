//! Tracing subscriber setup.
//!
//! JSON log lines filtered by `RUST_LOG`, defaulting to debug output for
//! this crate and info for everything else.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "trove_api=debug,info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing() -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(service = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), "Tracing initialized");
    Ok(())
}
