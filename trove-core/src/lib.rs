//! Trove Core - Domain Types
//!
//! Validated identifiers, the row and lease models, the schema migration
//! engine and the error taxonomy. No I/O happens in this crate; every other
//! Trove crate depends on it.

use chrono::{DateTime, Utc};

pub mod clock;
pub mod error;
pub mod identifier;
pub mod lease;
pub mod migration;
pub mod row;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds, as leases are requested on the wire.
pub type DurationMs = i64;

pub use clock::{Clock, SystemClock};
pub use error::{ErrorKind, MigrationError, TransformError, TroveError, TroveResult};
pub use identifier::{is_safe_identifier, Identifier, IdentifierKind};
pub use lease::{
    ClaimOutcome, LeaseClaim, LeaseCondition, LeaseMutation, LeaseRecord, LeaseRef, LeaseStatus,
};
pub use migration::{MigrationContext, MigrationRegistry, Transform, VersionGraph};
pub use row::{
    ColumnData, ColumnSelection, ColumnValues, RowKey, SchemaVersion, StoredRow,
    SCHEMA_VERSION_COLUMN,
};
