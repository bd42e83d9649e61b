//! Wall-clock abstraction.
//!
//! Lease expiry is decided by comparing timestamps against "now". Owning
//! the clock lets tests move time forward deterministically instead of
//! sleeping through lease durations; the manual clock for that lives in
//! `trove-test-utils`.

use chrono::Utc;

use crate::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
