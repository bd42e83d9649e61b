//! Trove Storage - Storage Traits, Statement Builder and In-Memory Backend
//!
//! Defines the storage abstraction for rows and leases. The PostgreSQL
//! implementation lives in trove-api.

pub mod memory;
pub mod query;
pub mod store;

pub use memory::InMemoryStore;
pub use query::{check_lease_pair, Bind, QueryBuilder, Statement, LEASE_COLUMNS};
pub use store::{ColumnStore, LeaseStore};
