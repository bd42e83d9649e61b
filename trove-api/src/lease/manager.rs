//! Lease Manager
//!
//! Grants, renews, transfers and releases leases through the store's
//! conditional-write primitive, and mirrors successful grants into the
//! local [`LeaseCache`].
//!
//! A claim tries three conditional writes in order and stops at the first
//! one applied:
//!
//! 1. acquire: insert iff no row exists
//! 2. renew: refresh timestamps iff the row is ours
//! 3. takeover: reassign iff the row expired before now
//!
//! Each step is atomic in the store, so two servers racing on the same
//! subject can never both be granted a live lease.

use std::sync::Arc;

use chrono::Duration;
use trove_core::{
    ClaimOutcome, Clock, LeaseClaim, LeaseCondition, LeaseMutation, LeaseRecord, LeaseStatus,
    TroveError, TroveResult,
};
use trove_storage::LeaseStore;

use super::cache::{CacheCheck, CachedLease, LeaseCache};
use crate::constants::LEASE_DURATION_OUT_OF_RANGE;
use crate::telemetry::METRICS;

/// Lease protocol over a [`LeaseStore`].
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    cache: LeaseCache,
    clock: Arc<dyn Clock>,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn LeaseStore>, cache: LeaseCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache,
            clock,
        }
    }

    pub fn cache(&self) -> &LeaseCache {
        &self.cache
    }

    /// Claim `subject_id` for `owner_id` for `lease_duration` from now.
    pub async fn claim(
        &self,
        subject_id: &str,
        owner_id: &str,
        lease_duration: Duration,
    ) -> TroveResult<LeaseClaim> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(lease_duration)
            .ok_or_else(|| TroveError::invalid_request(LEASE_DURATION_OUT_OF_RANGE))?;
        let record = LeaseRecord {
            subject_id: subject_id.to_string(),
            owner_id: owner_id.to_string(),
            last_renewed: now,
            expires_at,
        };

        let attempts = [
            (
                ClaimOutcome::Acquired,
                LeaseCondition::Absent,
                LeaseMutation::Insert(record.clone()),
            ),
            (
                ClaimOutcome::Renewed,
                LeaseCondition::OwnedBy(owner_id.to_string()),
                LeaseMutation::Refresh {
                    last_renewed: now,
                    expires_at,
                },
            ),
            (
                ClaimOutcome::TakenOver,
                LeaseCondition::ExpiredBefore(now),
                LeaseMutation::Reassign(record),
            ),
        ];

        for (outcome, condition, mutation) in &attempts {
            if let Some(row) = self
                .store
                .compare_and_swap(subject_id, condition, mutation)
                .await?
            {
                self.cache.put(
                    subject_id,
                    CachedLease {
                        owner_id: row.owner_id.clone(),
                        expires_at: row.expires_at,
                    },
                );
                record_claim(*outcome);
                tracing::debug!(
                    subject_id,
                    owner_id,
                    outcome = %outcome,
                    expires_at = %row.expires_at,
                    "Lease granted"
                );
                return Ok(LeaseClaim {
                    outcome: *outcome,
                    expires_at: Some(row.expires_at),
                });
            }
        }

        record_claim(ClaimOutcome::Contended);
        tracing::debug!(subject_id, owner_id, "Lease contended");
        Ok(LeaseClaim {
            outcome: ClaimOutcome::Contended,
            expires_at: None,
        })
    }

    /// Release `subject_id` iff `owner_id` holds it. Returns whether a row
    /// was deleted.
    pub async fn release(&self, subject_id: &str, owner_id: &str) -> TroveResult<bool> {
        let owned = LeaseCondition::OwnedBy(owner_id.to_string());
        let released = self
            .store
            .compare_and_swap(subject_id, &owned, &LeaseMutation::Delete)
            .await?
            .is_some();
        if released {
            self.cache.remove(subject_id);
        }
        tracing::debug!(subject_id, owner_id, released, "Lease release");
        Ok(released)
    }

    /// Who holds `subject_id` according to the store.
    pub async fn status(&self, subject_id: &str) -> TroveResult<LeaseStatus> {
        let record = self.store.get_lease(subject_id).await?;
        Ok(LeaseStatus::from_record(record, self.clock.now()))
    }

    /// Gate for data requests: the local cache must hold a live lease on
    /// `subject_id` owned by `owner_id`.
    pub fn validate_local(&self, subject_id: &str, owner_id: &str) -> TroveResult<()> {
        match self.cache.check(subject_id, owner_id, self.clock.now()) {
            CacheCheck::Valid(_) => Ok(()),
            CacheCheck::Missing => Err(TroveError::NotHeld {
                subject_id: subject_id.to_string(),
            }),
            CacheCheck::WrongOwner(_) => Err(TroveError::WrongOwner {
                subject_id: subject_id.to_string(),
                owner_id: owner_id.to_string(),
            }),
            CacheCheck::Expired(_) => Err(TroveError::Expired {
                subject_id: subject_id.to_string(),
            }),
        }
    }

    /// Evict expired cache entries. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let dropped = self.cache.sweep(self.clock.now());
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.set_lease_cache_entries(self.cache.len());
        }
        dropped
    }
}

fn record_claim(outcome: ClaimOutcome) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_lease_claim(outcome.as_str());
    }
}
