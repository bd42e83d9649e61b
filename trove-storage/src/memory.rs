//! In-memory backend.
//!
//! Implements both storage traits over process-local maps with the same
//! observable semantics as the PostgreSQL backend: upserts keyed by the
//! exact super-key, reads matching on the given super-key pairs, and
//! lease writes applied atomically under one lock.

use ::async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use trove_core::{
    ColumnData, ColumnSelection, ColumnValues, Identifier, LeaseCondition, LeaseMutation,
    LeaseRecord, RowKey, SchemaVersion, StoredRow, TroveError, TroveResult,
};

use crate::query::check_lease_pair;
use crate::store::{ColumnStore, LeaseStore};

#[derive(Debug, Clone)]
struct MemoryRow {
    columns: ColumnData,
    schema_version: SchemaVersion,
}

type TableRows = BTreeMap<BTreeMap<Identifier, String>, MemoryRow>;

/// Process-local store for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<Identifier, TableRows>>>,
    leases: Arc<Mutex<HashMap<String, LeaseRecord>>>,
    unavailable: Arc<AtomicBool>,
    saves: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a storage error, as if the
    /// backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful `save_row` and `update_row` calls.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Schema version stored for the row with exactly this super-key.
    pub async fn stored_version(&self, key: &RowKey) -> Option<SchemaVersion> {
        let tables = self.tables.read().await;
        tables
            .get(key.table())
            .and_then(|rows| rows.get(key.super_keys()))
            .map(|row| row.schema_version.clone())
    }

    fn check_available(&self, operation: &str) -> TroveResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TroveError::storage(operation, "backend unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ColumnStore for InMemoryStore {
    async fn save_row(
        &self,
        key: &RowKey,
        columns: &ColumnValues,
        version: &SchemaVersion,
    ) -> TroveResult<()> {
        self.check_available("save")?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(key.table().clone()).or_default();
        let row = rows
            .entry(key.super_keys().clone())
            .or_insert_with(|| MemoryRow {
                columns: ColumnData::new(),
                schema_version: version.clone(),
            });
        for (name, value) in columns.as_map() {
            row.columns.insert(name.clone(), value.clone());
        }
        row.schema_version = version.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_row(
        &self,
        key: &RowKey,
        columns: &ColumnValues,
        version: &SchemaVersion,
    ) -> TroveResult<u64> {
        self.check_available("update")?;
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(key.table()) else {
            return Ok(0);
        };
        let mut updated = 0;
        for (_, row) in rows
            .iter_mut()
            .filter(|(stored_key, _)| key.matches(stored_key))
        {
            for (name, value) in columns.as_map() {
                row.columns.insert(name.clone(), value.clone());
            }
            row.schema_version = version.clone();
            updated += 1;
        }
        if updated > 0 {
            self.saves.fetch_add(1, Ordering::SeqCst);
        }
        Ok(updated)
    }

    async fn load_row(&self, key: &RowKey, columns: &ColumnSelection) -> TroveResult<StoredRow> {
        self.check_available("load")?;
        let tables = self.tables.read().await;
        let mut matches = tables
            .get(key.table())
            .into_iter()
            .flat_map(|rows| rows.iter())
            .filter(|(stored_key, _)| key.matches(stored_key))
            .map(|(_, row)| row);
        let row = matches.next().ok_or_else(|| TroveError::NotFound {
            table: key.table().to_string(),
        })?;
        if matches.next().is_some() {
            return Err(TroveError::ambiguous_row(key.table()));
        }

        let selected = columns
            .columns()
            .iter()
            .filter_map(|name| {
                row.columns
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        Ok(StoredRow {
            columns: selected,
            schema_version: row.schema_version.clone(),
        })
    }

    async fn row_exists(&self, key: &RowKey) -> TroveResult<bool> {
        self.check_available("exists")?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(key.table())
            .map(|rows| rows.keys().any(|stored_key| key.matches(stored_key)))
            .unwrap_or(false))
    }

    async fn ping(&self) -> TroveResult<()> {
        self.check_available("ping")
    }
}

#[async_trait]
impl LeaseStore for InMemoryStore {
    async fn compare_and_swap(
        &self,
        subject_id: &str,
        condition: &LeaseCondition,
        mutation: &LeaseMutation,
    ) -> TroveResult<Option<LeaseRecord>> {
        self.check_available("lease write")?;
        check_lease_pair(condition, mutation)?;

        let mut leases = self.leases.lock().await;
        let current = leases.get(subject_id);
        let holds = match condition {
            LeaseCondition::Absent => current.is_none(),
            LeaseCondition::OwnedBy(owner) => current.is_some_and(|r| &r.owner_id == owner),
            LeaseCondition::ExpiredBefore(now) => current.is_some_and(|r| r.expires_at < *now),
        };
        if !holds {
            return Ok(None);
        }

        let applied = match mutation {
            LeaseMutation::Insert(record) => {
                let record = LeaseRecord {
                    subject_id: subject_id.to_string(),
                    ..record.clone()
                };
                leases.insert(subject_id.to_string(), record.clone());
                Some(record)
            }
            LeaseMutation::Refresh {
                last_renewed,
                expires_at,
            } => leases.get_mut(subject_id).map(|row| {
                row.last_renewed = *last_renewed;
                row.expires_at = row.expires_at.max(*expires_at);
                row.clone()
            }),
            LeaseMutation::Reassign(record) => leases.get_mut(subject_id).map(|row| {
                row.owner_id = record.owner_id.clone();
                row.last_renewed = record.last_renewed;
                row.expires_at = record.expires_at;
                row.clone()
            }),
            LeaseMutation::Delete => leases.remove(subject_id),
        };
        Ok(applied)
    }

    async fn get_lease(&self, subject_id: &str) -> TroveResult<Option<LeaseRecord>> {
        self.check_available("lease read")?;
        Ok(self.leases.lock().await.get(subject_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use trove_core::{ErrorKind, Timestamp};

    fn key(user: &str, slot: &str) -> RowKey {
        RowKey::new("players", [("user_id", user), ("slot", slot)]).unwrap()
    }

    fn t0() -> Timestamp {
        Utc.timestamp_millis_opt(1_704_067_200_000).unwrap()
    }

    fn record(owner: &str, expires_at: Timestamp) -> LeaseRecord {
        LeaseRecord {
            subject_id: "u1".to_string(),
            owner_id: owner.to_string(),
            last_renewed: t0(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemoryStore::new();
        let key = key("u1", "0");
        let values = ColumnValues::new(&key, [("data", b"hello".to_vec())]).unwrap();
        store
            .save_row(&key, &values, &SchemaVersion::from("v1"))
            .await
            .unwrap();

        let selection = ColumnSelection::new(&key, ["data"]).unwrap();
        let row = store.load_row(&key, &selection).await.unwrap();
        assert_eq!(row.schema_version, SchemaVersion::from("v1"));
        assert_eq!(row.columns.values().next().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_save_merges_columns_and_restamps_version() {
        let store = InMemoryStore::new();
        let key = key("u1", "0");
        let first = ColumnValues::new(&key, [("data", vec![1]), ("bank", vec![2])]).unwrap();
        let second = ColumnValues::new(&key, [("data", vec![9])]).unwrap();
        store.save_row(&key, &first, &"v1".into()).await.unwrap();
        store.save_row(&key, &second, &"v2".into()).await.unwrap();

        let selection = ColumnSelection::new(&key, ["data", "bank"]).unwrap();
        let row = store.load_row(&key, &selection).await.unwrap();
        let values: Vec<&Vec<u8>> = row.columns.values().collect();
        assert_eq!(values, vec![&vec![2u8], &vec![9u8]]);
        assert_eq!(row.schema_version, SchemaVersion::from("v2"));
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_row_and_null_columns() {
        let store = InMemoryStore::new();
        let key = key("u1", "0");
        let selection = ColumnSelection::new(&key, ["data", "bank"]).unwrap();
        let err = store.load_row(&key, &selection).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!store.row_exists(&key).await.unwrap());

        let values = ColumnValues::new(&key, [("data", vec![1])]).unwrap();
        store.save_row(&key, &values, &"v1".into()).await.unwrap();
        let row = store.load_row(&key, &selection).await.unwrap();
        assert_eq!(row.columns.len(), 1);
        assert!(store.row_exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_super_key_matches() {
        let store = InMemoryStore::new();
        let full = key("u1", "0");
        let values = ColumnValues::new(&full, [("data", vec![1])]).unwrap();
        store.save_row(&full, &values, &"v1".into()).await.unwrap();

        let partial = RowKey::new("players", [("user_id", "u1")]).unwrap();
        assert!(store.row_exists(&partial).await.unwrap());
        let other = RowKey::new("players", [("user_id", "u2")]).unwrap();
        assert!(!store.row_exists(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_targets_the_matched_row() {
        let store = InMemoryStore::new();
        let full = key("u1", "0");
        let values = ColumnValues::new(&full, [("data", vec![1]), ("bank", vec![2])]).unwrap();
        store.save_row(&full, &values, &"v1".into()).await.unwrap();

        let partial = RowKey::new("players", [("user_id", "u1")]).unwrap();
        let upgraded = ColumnValues::new(&partial, [("data", vec![9])]).unwrap();
        assert_eq!(store.update_row(&partial, &upgraded, &"v2".into()).await.unwrap(), 1);
        assert_eq!(store.stored_version(&full).await, Some(SchemaVersion::from("v2")));
        assert_eq!(store.stored_version(&partial).await, None);

        let selection = ColumnSelection::new(&full, ["data", "bank"]).unwrap();
        let row = store.load_row(&full, &selection).await.unwrap();
        let values: Vec<&Vec<u8>> = row.columns.values().collect();
        assert_eq!(values, vec![&vec![2u8], &vec![9u8]]);

        let missing = RowKey::new("players", [("user_id", "u2")]).unwrap();
        assert_eq!(store.update_row(&missing, &upgraded, &"v2".into()).await.unwrap(), 0);
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_load_rejects_ambiguous_super_key() {
        let store = InMemoryStore::new();
        for slot in ["0", "1"] {
            let full = key("u1", slot);
            let values = ColumnValues::new(&full, [("data", vec![1])]).unwrap();
            store.save_row(&full, &values, &"v1".into()).await.unwrap();
        }

        let partial = RowKey::new("players", [("user_id", "u1")]).unwrap();
        let selection = ColumnSelection::new(&partial, ["data"]).unwrap();
        let err = store.load_row(&partial, &selection).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.to_string(), "super keys match more than one row in players");

        assert!(store.load_row(&key("u1", "1"), &selection).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert_eq!(store.ping().await.unwrap_err().kind(), ErrorKind::Storage);
        let err = store.get_lease("u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_lease_insert_is_exclusive() {
        let store = InMemoryStore::new();
        let later = t0() + Duration::seconds(5);
        let first = store
            .compare_and_swap("u1", &LeaseCondition::Absent, &LeaseMutation::Insert(record("s1", later)))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .compare_and_swap("u1", &LeaseCondition::Absent, &LeaseMutation::Insert(record("s2", later)))
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.get_lease("u1").await.unwrap().unwrap().owner_id, "s1");
    }

    #[tokio::test]
    async fn test_lease_refresh_never_shortens() {
        let store = InMemoryStore::new();
        let far = t0() + Duration::seconds(60);
        store
            .compare_and_swap("u1", &LeaseCondition::Absent, &LeaseMutation::Insert(record("s1", far)))
            .await
            .unwrap();

        let refreshed = store
            .compare_and_swap(
                "u1",
                &LeaseCondition::OwnedBy("s1".to_string()),
                &LeaseMutation::Refresh {
                    last_renewed: t0() + Duration::seconds(1),
                    expires_at: t0() + Duration::seconds(10),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.expires_at, far);
        assert_eq!(refreshed.last_renewed, t0() + Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_lease_reassign_requires_expiry() {
        let store = InMemoryStore::new();
        let expiry = t0() + Duration::seconds(5);
        store
            .compare_and_swap("u1", &LeaseCondition::Absent, &LeaseMutation::Insert(record("s1", expiry)))
            .await
            .unwrap();

        let takeover = LeaseMutation::Reassign(record("s2", expiry + Duration::seconds(5)));
        let early = store
            .compare_and_swap("u1", &LeaseCondition::ExpiredBefore(expiry), &takeover)
            .await
            .unwrap();
        assert!(early.is_none());

        let late = store
            .compare_and_swap(
                "u1",
                &LeaseCondition::ExpiredBefore(expiry + Duration::milliseconds(1)),
                &takeover,
            )
            .await
            .unwrap();
        assert_eq!(late.unwrap().owner_id, "s2");
    }

    #[tokio::test]
    async fn test_lease_delete_is_owner_scoped() {
        let store = InMemoryStore::new();
        let expiry = t0() + Duration::seconds(5);
        store
            .compare_and_swap("u1", &LeaseCondition::Absent, &LeaseMutation::Insert(record("s1", expiry)))
            .await
            .unwrap();

        let wrong = store
            .compare_and_swap("u1", &LeaseCondition::OwnedBy("s2".to_string()), &LeaseMutation::Delete)
            .await
            .unwrap();
        assert!(wrong.is_none());

        let right = store
            .compare_and_swap("u1", &LeaseCondition::OwnedBy("s1".to_string()), &LeaseMutation::Delete)
            .await
            .unwrap();
        assert!(right.is_some());
        assert!(store.get_lease("u1").await.unwrap().is_none());
    }
}
