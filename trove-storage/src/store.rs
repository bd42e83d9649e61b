//! Async storage traits.
//!
//! Two seams: [`ColumnStore`] for generic game-state rows and
//! [`LeaseStore`] for lease rows. Both are object safe so the service can
//! hold `Arc<dyn ...>` and swap the PostgreSQL backend for the in-memory
//! one in tests.

use ::async_trait::async_trait;
use trove_core::{
    ColumnSelection, ColumnValues, LeaseCondition, LeaseMutation, LeaseRecord, RowKey,
    SchemaVersion, StoredRow, TroveResult,
};

/// Generic row storage keyed by table and super-key.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Upsert every given column plus the schema version. Unconditional
    /// and idempotent.
    async fn save_row(
        &self,
        key: &RowKey,
        columns: &ColumnValues,
        version: &SchemaVersion,
    ) -> TroveResult<()>;

    /// Overwrite the given columns and the schema version on the row the
    /// super-key matches. Never inserts. Returns how many rows changed.
    async fn update_row(
        &self,
        key: &RowKey,
        columns: &ColumnValues,
        version: &SchemaVersion,
    ) -> TroveResult<u64>;

    /// Read the selected columns and the schema version of the single row
    /// matching the super-key.
    ///
    /// Fails with `NotFound` when nothing matches and `InvalidRequest` when
    /// the super-key matches more than one row.
    async fn load_row(&self, key: &RowKey, columns: &ColumnSelection) -> TroveResult<StoredRow>;

    /// Whether any row matches the super-key.
    async fn row_exists(&self, key: &RowKey) -> TroveResult<bool>;

    /// Backend liveness probe.
    async fn ping(&self) -> TroveResult<()>;
}

/// Lease rows with a single conditional-write primitive.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Apply `mutation` to the lease row for `subject_id` iff `condition`
    /// holds, atomically.
    ///
    /// Returns the resulting row (the removed row for `Delete`) when the
    /// write was applied and `None` when the condition rejected it.
    async fn compare_and_swap(
        &self,
        subject_id: &str,
        condition: &LeaseCondition,
        mutation: &LeaseMutation,
    ) -> TroveResult<Option<LeaseRecord>>;

    /// Current lease row, live or not.
    async fn get_lease(&self, subject_id: &str) -> TroveResult<Option<LeaseRecord>>;
}
