//! Request Orchestrator
//!
//! Every data request passes the local lease gate before any name is
//! validated or any statement is built. Loads upgrade stale rows through
//! the migration registry and write the upgraded columns back before
//! answering, so the next load of the same row skips migration.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use trove_core::{
    ColumnData, ColumnSelection, ColumnValues, LeaseClaim, LeaseRef, LeaseStatus,
    MigrationRegistry, RowKey, TroveError, TroveResult,
};
use trove_storage::ColumnStore;

use crate::constants::LEASE_DURATION_OUT_OF_RANGE;
use crate::lease::LeaseManager;
use crate::telemetry::METRICS;

/// The Trove service: lease protocol plus lease-gated row access.
#[derive(Clone)]
pub struct TroveService {
    store: Arc<dyn ColumnStore>,
    leases: LeaseManager,
    migrations: Arc<MigrationRegistry>,
}

impl TroveService {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        leases: LeaseManager,
        migrations: MigrationRegistry,
    ) -> Self {
        Self {
            store,
            leases,
            migrations: Arc::new(migrations),
        }
    }

    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Backend liveness, for the readiness probe.
    pub async fn ping(&self) -> TroveResult<()> {
        timed("ping", self.store.ping()).await
    }

    // ------------------------------------------------------------------
    // Lease operations
    // ------------------------------------------------------------------

    /// Acquire, renew or take over the lease on `subject_id`.
    pub async fn claim_lock(
        &self,
        subject_id: &str,
        owner_id: &str,
        lease_duration_ms: i64,
    ) -> TroveResult<LeaseClaim> {
        if subject_id.is_empty() || owner_id.is_empty() || lease_duration_ms <= 0 {
            return Err(TroveError::invalid_request(
                "subject_id, owner_id and lease_duration_ms are required",
            ));
        }

        let lease_duration = Duration::try_milliseconds(lease_duration_ms)
            .ok_or_else(|| TroveError::invalid_request(LEASE_DURATION_OUT_OF_RANGE))?;
        let claim = self
            .leases
            .claim(subject_id, owner_id, lease_duration)
            .await?;
        if !claim.granted() {
            return Err(TroveError::LeaseContended {
                subject_id: subject_id.to_string(),
            });
        }
        Ok(claim)
    }

    /// Release the lease on `subject_id` if `owner_id` holds it.
    pub async fn release_lock(&self, subject_id: &str, owner_id: &str) -> TroveResult<()> {
        if subject_id.is_empty() || owner_id.is_empty() {
            return Err(TroveError::invalid_request(
                "subject_id and owner_id are required",
            ));
        }

        if self.leases.release(subject_id, owner_id).await? {
            Ok(())
        } else {
            Err(TroveError::ReleaseRejected {
                subject_id: subject_id.to_string(),
            })
        }
    }

    pub async fn lock_status(&self, subject_id: &str) -> TroveResult<LeaseStatus> {
        if subject_id.is_empty() {
            return Err(TroveError::invalid_request("subject_id is required"));
        }
        self.leases.status(subject_id).await
    }

    // ------------------------------------------------------------------
    // Data operations
    // ------------------------------------------------------------------

    /// Write `columns` to the row at `table`/`super_keys`, stamped with the
    /// table's latest schema version.
    pub async fn save<I, K, V, C, N>(
        &self,
        lease: &LeaseRef,
        table: &str,
        super_keys: I,
        columns: C,
    ) -> TroveResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        C: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        self.leases
            .validate_local(&lease.subject_id, &lease.owner_id)?;

        let key = RowKey::new(table, super_keys)?;
        let values = ColumnValues::new(&key, columns)?;
        let latest = self.migrations.latest_for(key.table());

        timed("save_row", self.store.save_row(&key, &values, latest)).await?;
        tracing::debug!(
            table = %key.table(),
            columns = values.as_map().len(),
            version = %latest,
            "Row saved"
        );
        Ok(())
    }

    /// Read `columns` from the row at `table`/`super_keys`, upgraded to the
    /// table's latest schema version.
    ///
    /// `super_keys` must match exactly one row. A stale row is migrated and
    /// written back to that same row before returning. If the migration or
    /// the write-back fails nothing is returned and nothing is persisted.
    ///
    /// Only the selected columns are upgraded, but the write-back stamps the
    /// whole row at latest. Columns left out of `columns` keep their stored
    /// bytes under the new version, so callers must load every versioned
    /// column of a row together.
    pub async fn load<I, K, V, C, N>(
        &self,
        lease: &LeaseRef,
        table: &str,
        super_keys: I,
        columns: C,
    ) -> TroveResult<ColumnData>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        C: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.leases
            .validate_local(&lease.subject_id, &lease.owner_id)?;

        let key = RowKey::new(table, super_keys)?;
        let selection = ColumnSelection::new(&key, columns)?;

        let row = timed("load_row", self.store.load_row(&key, &selection)).await?;

        let graph = self.migrations.graph_for(key.table());
        if &row.schema_version == graph.latest() {
            return Ok(row.columns);
        }
        // Every selected column was null; there is nothing to upgrade.
        if row.columns.is_empty() {
            return Ok(row.columns);
        }

        let upgraded = match graph.upgrade_columns(key.table(), &row.schema_version, row.columns) {
            Ok(upgraded) => {
                record_migration(true);
                upgraded
            }
            Err(e) => {
                record_migration(false);
                tracing::warn!(
                    table = %key.table(),
                    from = %row.schema_version,
                    to = %graph.latest(),
                    error = %e,
                    "Row migration failed"
                );
                return Err(e.into());
            }
        };

        let values = ColumnValues::from_data(upgraded)?;
        let updated =
            timed("update_row", self.store.update_row(&key, &values, graph.latest())).await?;
        if updated != 1 {
            tracing::warn!(
                table = %key.table(),
                updated,
                "Write-back did not hit exactly the row that was read"
            );
            return Err(TroveError::storage(
                "write-back",
                format!("expected to update 1 row, updated {updated}"),
            ));
        }
        tracing::debug!(
            table = %key.table(),
            from = %row.schema_version,
            to = %graph.latest(),
            "Row migrated and written back"
        );

        Ok(values.into_map())
    }

    /// Whether any row in `table` matches `super_keys`.
    pub async fn exists<I, K, V>(
        &self,
        lease: &LeaseRef,
        table: &str,
        super_keys: I,
    ) -> TroveResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.leases
            .validate_local(&lease.subject_id, &lease.owner_id)?;

        let key = RowKey::new(table, super_keys)?;
        timed("row_exists", self.store.row_exists(&key)).await
    }
}

/// Run a store call, recording its latency and outcome.
async fn timed<T, F>(operation: &'static str, call: F) -> TroveResult<T>
where
    F: Future<Output = TroveResult<T>>,
{
    let start = Instant::now();
    let result = call.await;
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_storage_operation(operation, result.is_ok(), start.elapsed().as_secs_f64());
    }
    result
}

fn record_migration(success: bool) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_migration(success);
    }
}
