//! Background Jobs for Trove API
//!
//! This module contains background tasks that run periodically:
//!
//! - `lease_sweep`: Evicts expired entries from the local lease cache
//!
//! # Usage
//!
//! Background jobs are spawned during server startup:
//!
//! ```ignore
//! use trove_api::jobs::{lease_sweep_task, LeaseSweepConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(lease_sweep_task(leases.clone(), LeaseSweepConfig::default(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod lease_sweep;

pub use lease_sweep::{lease_sweep_task, LeaseSweepConfig, LeaseSweepMetrics, LeaseSweepSnapshot};
