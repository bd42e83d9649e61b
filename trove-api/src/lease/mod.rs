//! Distributed leases: the manager that talks to the lease store and the
//! local cache that gates data requests.

pub mod cache;
pub mod manager;

pub use cache::{CacheCheck, CachedLease, LeaseCache};
pub use manager::LeaseManager;
