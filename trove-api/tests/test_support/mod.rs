//! Shared harness for trove-api integration tests.
//!
//! A "fleet" is several servers, each with its own lease cache, sharing one
//! in-memory backend and one manual clock. That is the shape of a real
//! deployment: private process memory, shared store, shared wall clock.

#![allow(dead_code)]

use std::sync::Arc;

use trove_api::{LeaseCache, LeaseManager, TroveService};
use trove_test_utils::{InMemoryStore, ManualClock, MigrationRegistry, VersionGraph};

pub struct Fleet {
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
    pub servers: Vec<TroveService>,
}

impl Fleet {
    /// `count` servers sharing one registry built by `registry`.
    pub fn new(count: usize, registry: impl Fn() -> MigrationRegistry) -> Self {
        let store = InMemoryStore::new();
        let clock = Arc::new(ManualClock::at_epoch_2024());
        let servers = (0..count)
            .map(|_| {
                let leases =
                    LeaseManager::new(Arc::new(store.clone()), LeaseCache::new(), clock.clone());
                TroveService::new(Arc::new(store.clone()), leases, registry())
            })
            .collect();
        Self {
            store,
            clock,
            servers,
        }
    }

    /// Servers whose registry knows only `latest`.
    pub fn at_version(count: usize, latest: &str) -> Self {
        let latest = latest.to_string();
        Self::new(count, move || MigrationRegistry::new(VersionGraph::new(latest.clone())))
    }

    pub fn server(&self, index: usize) -> &TroveService {
        &self.servers[index]
    }

    /// Owner id the harness uses for server `index`.
    pub fn owner(index: usize) -> String {
        format!("s{}", index + 1)
    }
}

/// A runtime for driving async code inside proptest bodies.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}
