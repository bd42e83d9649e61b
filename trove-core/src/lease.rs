//! Lease model.
//!
//! A lease is a time-bounded exclusive claim by one owner (a game server)
//! over one subject (a player). Ownership across processes is decided by
//! conditional writes against the lease row; this module only describes
//! the row, the conditions and the mutations.
//!
//! # State Transition Diagram
//!
//! ```text
//! Unheld ── acquire ──→ Held(owner, expiry) ── release ──→ Unheld
//!   ↑                        │    ↺ renew (same owner)
//!   └──── expiry passes ─────┤
//!                            └── takeover (expired) ──→ Held(other, expiry')
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Timestamp;

/// A persisted lease row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub subject_id: String,
    pub owner_id: String,
    pub last_renewed: Timestamp,
    pub expires_at: Timestamp,
}

impl LeaseRecord {
    /// A row whose expiry has passed is dead even if it still exists.
    pub fn is_live(&self, now: Timestamp) -> bool {
        now <= self.expires_at
    }
}

/// Predicate a lease write is conditional on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseCondition {
    /// No row exists for the subject.
    Absent,
    /// The row exists and is held by this owner.
    OwnedBy(String),
    /// The row exists and expired strictly before this instant.
    ExpiredBefore(Timestamp),
}

/// Change applied when a [`LeaseCondition`] holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseMutation {
    /// Create the row.
    Insert(LeaseRecord),
    /// Bump timestamps, keeping the owner. The stored expiry never moves
    /// backwards.
    Refresh {
        last_renewed: Timestamp,
        expires_at: Timestamp,
    },
    /// Replace owner and timestamps.
    Reassign(LeaseRecord),
    /// Remove the row.
    Delete,
}

/// How a claim was granted, or that it was not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimOutcome {
    Acquired,
    Renewed,
    TakenOver,
    Contended,
}

impl ClaimOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimOutcome::Acquired => "acquired",
            ClaimOutcome::Renewed => "renewed",
            ClaimOutcome::TakenOver => "taken_over",
            ClaimOutcome::Contended => "contended",
        }
    }
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseClaim {
    pub outcome: ClaimOutcome,
    /// Set when the claim was granted.
    pub expires_at: Option<Timestamp>,
}

impl LeaseClaim {
    pub fn granted(&self) -> bool {
        self.outcome != ClaimOutcome::Contended
    }
}

/// Snapshot of who, if anyone, holds a subject.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeaseStatus {
    pub held: bool,
    pub owner_id: Option<String>,
    pub expires_at: Option<Timestamp>,
}

impl LeaseStatus {
    pub fn unheld() -> Self {
        Self::default()
    }

    /// Build a status from a stored row, treating expired rows as absent.
    pub fn from_record(record: Option<LeaseRecord>, now: Timestamp) -> Self {
        match record {
            Some(record) if record.is_live(now) => Self {
                held: true,
                owner_id: Some(record.owner_id),
                expires_at: Some(record.expires_at),
            },
            _ => Self::unheld(),
        }
    }
}

/// The lease a data request claims to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRef {
    pub subject_id: String,
    pub owner_id: String,
}

impl LeaseRef {
    pub fn new(subject_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            owner_id: owner_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(expires_in_ms: i64) -> (LeaseRecord, Timestamp) {
        let now = Utc.timestamp_millis_opt(1_704_067_200_000).unwrap();
        (
            LeaseRecord {
                subject_id: "u1".to_string(),
                owner_id: "s1".to_string(),
                last_renewed: now,
                expires_at: now + Duration::milliseconds(expires_in_ms),
            },
            now,
        )
    }

    #[test]
    fn test_status_reports_live_lease() {
        let (rec, now) = record(5_000);
        let status = LeaseStatus::from_record(Some(rec), now);
        assert!(status.held);
        assert_eq!(status.owner_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_status_treats_expired_row_as_absent() {
        let (rec, now) = record(5_000);
        let later = now + Duration::milliseconds(5_001);
        assert_eq!(LeaseStatus::from_record(Some(rec), later), LeaseStatus::unheld());
        assert_eq!(LeaseStatus::from_record(None, now), LeaseStatus::unheld());
    }

    #[test]
    fn test_claim_granted() {
        let claim = LeaseClaim {
            outcome: ClaimOutcome::Contended,
            expires_at: None,
        };
        assert!(!claim.granted());
        let claim = LeaseClaim {
            outcome: ClaimOutcome::TakenOver,
            expires_at: None,
        };
        assert!(claim.granted());
    }
}
