//! Error types for Trove operations

use crate::identifier::IdentifierKind;
use crate::SchemaVersion;
use thiserror::Error;

/// Failure reported by a single migration transform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Schema upgrade errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("no migration path from {from} to {to}")]
    NoMigrationPath { from: SchemaVersion, to: SchemaVersion },

    #[error("error transforming from {from} to {to}: {source}")]
    MigrationFailed {
        from: SchemaVersion,
        to: SchemaVersion,
        #[source]
        source: TransformError,
    },
}

/// Stable classification of [`TroveError`], used for metric labels and
/// for mapping into transport error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidIdentifier,
    InvalidRequest,
    NotHeld,
    WrongOwner,
    Expired,
    LeaseContended,
    ReleaseRejected,
    Storage,
    NotFound,
    NoMigrationPath,
    MigrationFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotHeld => "not_held",
            ErrorKind::WrongOwner => "wrong_owner",
            ErrorKind::Expired => "expired",
            ErrorKind::LeaseContended => "lease_contended",
            ErrorKind::ReleaseRejected => "release_rejected",
            ErrorKind::Storage => "storage",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoMigrationPath => "no_migration_path",
            ErrorKind::MigrationFailed => "migration_failed",
        }
    }

    /// Lease and validation failures are normal outcomes reported to the
    /// caller; everything else points at the backend or the schema graph.
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidIdentifier
                | ErrorKind::InvalidRequest
                | ErrorKind::NotHeld
                | ErrorKind::WrongOwner
                | ErrorKind::Expired
                | ErrorKind::LeaseContended
                | ErrorKind::ReleaseRejected
                | ErrorKind::NotFound
        )
    }
}

/// Master error type for all Trove errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TroveError {
    #[error("invalid {kind} name: {name}")]
    InvalidIdentifier { kind: IdentifierKind, name: String },

    #[error("{reason}")]
    InvalidRequest { reason: String },

    #[error("no lock held for this player")]
    NotHeld { subject_id: String },

    #[error("lock is owned by a different server")]
    WrongOwner { subject_id: String, owner_id: String },

    #[error("lock has expired")]
    Expired { subject_id: String },

    #[error("lock is held by another server")]
    LeaseContended { subject_id: String },

    #[error("cannot release: lock not held by you")]
    ReleaseRejected { subject_id: String },

    #[error("error during {operation}: {reason}")]
    Storage { operation: String, reason: String },

    #[error("no row found in {table} for the given super keys")]
    NotFound { table: String },

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl TroveError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        TroveError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// A super-key that matched more than one row where exactly one is
    /// required.
    pub fn ambiguous_row(table: impl std::fmt::Display) -> Self {
        Self::invalid_request(format!("super keys match more than one row in {table}"))
    }

    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        TroveError::Storage {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TroveError::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            TroveError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            TroveError::NotHeld { .. } => ErrorKind::NotHeld,
            TroveError::WrongOwner { .. } => ErrorKind::WrongOwner,
            TroveError::Expired { .. } => ErrorKind::Expired,
            TroveError::LeaseContended { .. } => ErrorKind::LeaseContended,
            TroveError::ReleaseRejected { .. } => ErrorKind::ReleaseRejected,
            TroveError::Storage { .. } => ErrorKind::Storage,
            TroveError::NotFound { .. } => ErrorKind::NotFound,
            TroveError::Migration(MigrationError::NoMigrationPath { .. }) => {
                ErrorKind::NoMigrationPath
            }
            TroveError::Migration(MigrationError::MigrationFailed { .. }) => {
                ErrorKind::MigrationFailed
            }
        }
    }
}

/// Result type alias for Trove operations.
pub type TroveResult<T> = Result<T, TroveError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_lease_messages_match_wire_text() {
        let subject_id = "u1".to_string();
        assert_eq!(
            TroveError::NotHeld { subject_id: subject_id.clone() }.to_string(),
            "no lock held for this player"
        );
        assert_eq!(
            TroveError::LeaseContended { subject_id }.to_string(),
            "lock is held by another server"
        );
    }

    #[test]
    fn test_invalid_identifier_display() {
        let err = TroveError::InvalidIdentifier {
            kind: IdentifierKind::Table,
            name: "players;".to_string(),
        };
        assert_eq!(err.to_string(), "invalid table name: players;");
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    }

    #[test]
    fn test_migration_failure_keeps_cause() {
        let err = TroveError::from(MigrationError::MigrationFailed {
            from: SchemaVersion::from("v1"),
            to: SchemaVersion::from("v2"),
            source: TransformError::new("truncated payload"),
        });
        assert_eq!(err.kind(), ErrorKind::MigrationFailed);
        assert!(err.to_string().contains("v1 to v2"));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("truncated payload"));
    }

    #[test]
    fn test_business_failure_classification() {
        assert!(ErrorKind::LeaseContended.is_business_failure());
        assert!(ErrorKind::NotFound.is_business_failure());
        assert!(!ErrorKind::Storage.is_business_failure());
        assert!(!ErrorKind::NoMigrationPath.is_business_failure());
    }
}
