//! Trove Test Utilities
//!
//! Shared test infrastructure for the Trove workspace:
//! - Proptest generators for names, keys, payloads and lease durations
//! - A manually advanced clock
//! - Fixtures for version graphs and rows
//! - Assertions on error kinds

// Re-export the in-memory backend from its source crate
pub use trove_storage::InMemoryStore;

// Re-export core types for convenience
pub use trove_core::{
    is_safe_identifier, ClaimOutcome, Clock, ColumnData, ErrorKind, Identifier, LeaseRef,
    MigrationContext, MigrationRegistry, RowKey, SchemaVersion, Timestamp,
    TransformError, TroveError, TroveResult, VersionGraph,
};

pub use clock::ManualClock;

// ============================================================================
// CLOCK
// ============================================================================

pub mod clock {
    //! Deterministic time for lease expiry tests.

    use chrono::{DateTime, Duration};
    use std::sync::atomic::{AtomicI64, Ordering};
    use trove_core::{Clock, Timestamp};

    /// Manually advanced clock.
    ///
    /// Millisecond resolution, matching the resolution leases are granted in.
    #[derive(Debug)]
    pub struct ManualClock {
        millis: AtomicI64,
    }

    impl ManualClock {
        pub fn new(start: Timestamp) -> Self {
            Self {
                millis: AtomicI64::new(start.timestamp_millis()),
            }
        }

        /// 2024-01-01 00:00:00 UTC.
        pub fn at_epoch_2024() -> Self {
            Self {
                millis: AtomicI64::new(1_704_067_200_000),
            }
        }

        pub fn advance(&self, by: Duration) {
            self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }

        pub fn advance_ms(&self, ms: i64) {
            self.millis.fetch_add(ms, Ordering::SeqCst);
        }

        pub fn set(&self, to: Timestamp) {
            self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            let millis = self.millis.load(Ordering::SeqCst);
            DateTime::from_timestamp_millis(millis)
                .expect("manual clock moved outside the representable range")
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Trove inputs.

    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Generate a name that passes identifier validation.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[A-Za-z_][A-Za-z0-9_]{0,15}"
    }

    /// Generate a name that fails identifier validation: a leading digit,
    /// or a character outside `[A-Za-z0-9_]` somewhere in it.
    pub fn arb_unsafe_identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9][A-Za-z0-9_]{0,8}",
            ("[A-Za-z_]{0,6}", "[ ;'\"\\-.()*=/]", "[A-Za-z0-9_]{0,6}")
                .prop_map(|(head, bad, tail)| format!("{head}{bad}{tail}")),
            Just(String::new()),
        ]
    }

    /// Generate one to three super-key pairs with safe names.
    pub fn arb_super_keys() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map(arb_identifier(), "[a-z0-9-]{1,12}", 1..4)
    }

    /// Generate an opaque column payload.
    pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..256)
    }

    /// Generate a positive lease duration in milliseconds (1ms to 10min).
    pub fn arb_lease_ms() -> impl Strategy<Value = i64> {
        1i64..600_000
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built graphs, keys and counters for common scenarios.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Version name used by [`linear_graph`]: `v1`, `v2`, ...
    pub fn version(n: usize) -> SchemaVersion {
        SchemaVersion::new(format!("v{n}"))
    }

    /// The `players` row key for `(slot, user_id)`.
    pub fn player_key(user_id: &str) -> RowKey {
        RowKey::new("players", [("slot", "0"), ("user_id", user_id)])
            .expect("fixture key names are valid identifiers")
    }

    /// Counts how many times the transforms it hands out are invoked.
    #[derive(Debug, Clone, Default)]
    pub struct TransformCounter {
        calls: Arc<AtomicUsize>,
    }

    impl TransformCounter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// A transform that appends `marker` to the payload.
        pub fn appending(
            &self,
            marker: &str,
        ) -> impl Fn(&MigrationContext<'_>, &[u8]) -> Result<Vec<u8>, TransformError>
               + Send
               + Sync
               + 'static {
            let calls = self.calls.clone();
            let marker = marker.to_string();
            move |_ctx: &MigrationContext<'_>, bytes: &[u8]| {
                calls.fetch_add(1, Ordering::SeqCst);
                let mut out = bytes.to_vec();
                out.extend_from_slice(marker.as_bytes());
                Ok(out)
            }
        }
    }

    /// `v1 -> v2 -> ... -> v{len}` with latest `v{len}`. Edge `vN -> vN+1`
    /// appends `+{N+1}` to the payload.
    pub fn linear_graph(len: usize, counter: &TransformCounter) -> VersionGraph {
        let mut graph = VersionGraph::new(version(len));
        for n in 1..len {
            graph.add_edge(version(n), version(n + 1), counter.appending(&format!("+{}", n + 1)));
        }
        graph
    }

    /// Payload `linear_graph` produces from `payload` when upgrading from
    /// `v{from}` to `v{len}`.
    pub fn linear_upgrade(payload: &[u8], from: usize, len: usize) -> Vec<u8> {
        let mut out = payload.to_vec();
        for n in from..len {
            out.extend_from_slice(format!("+{}", n + 1).as_bytes());
        }
        out
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on Trove results.

    use super::*;

    /// Assert that a result failed with the given kind.
    #[track_caller]
    pub fn assert_error_kind<T: std::fmt::Debug>(result: &TroveResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "wrong error kind: {e}"),
            Ok(value) => panic!("expected {kind:?} error, got Ok({value:?})"),
        }
    }

    /// Assert that a result failed with the given client-facing message.
    #[track_caller]
    pub fn assert_error_message<T: std::fmt::Debug>(result: &TroveResult<T>, message: &str) {
        match result {
            Err(e) => assert_eq!(e.to_string(), message),
            Ok(value) => panic!("expected error {message:?}, got Ok({value:?})"),
        }
    }
}
