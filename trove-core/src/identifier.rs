//! Identifier validation.
//!
//! Table, super-key and column names are interpolated into statement text
//! because the backend protocol cannot bind them as parameters. The only
//! way to obtain an [`Identifier`] is through [`Identifier::parse`], so
//! every statement builder that accepts identifiers is guaranteed to see
//! names matching `^[A-Za-z_][A-Za-z0-9_]*$`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;

use crate::error::{TroveError, TroveResult};

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex"));

/// Returns true iff `name` is a safe identifier.
pub fn is_safe_identifier(name: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(name)
}

/// What an identifier names. Carried in errors so callers can tell which
/// part of a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Table,
    SuperKey,
    Column,
    Namespace,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Table => "table",
            IdentifierKind::SuperKey => "super key",
            IdentifierKind::Column => "column",
            IdentifierKind::Namespace => "namespace",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated table, column or key name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validate `name` and wrap it.
    pub fn parse(kind: IdentifierKind, name: impl Into<String>) -> TroveResult<Self> {
        let name = name.into();
        if is_safe_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(TroveError::InvalidIdentifier { kind, name })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["players", "_hidden", "Player_Data2", "a", "_", "x1_y2"] {
            assert!(is_safe_identifier(name), "{name} should be accepted");
        }
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in [
            "",
            "1players",
            "players;",
            "players; DROP TABLE user_locks",
            "player-data",
            "player data",
            "players--",
            "\"quoted\"",
            "naïve",
            "col)",
        ] {
            assert!(!is_safe_identifier(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_parse_reports_kind_and_name() {
        let err = Identifier::parse(IdentifierKind::Column, "bad name").unwrap_err();
        match err {
            TroveError::InvalidIdentifier { kind, name } => {
                assert_eq!(kind, IdentifierKind::Column);
                assert_eq!(name, "bad name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn prop_generated_identifiers_are_safe(name in "[A-Za-z_][A-Za-z0-9_]{0,40}") {
            prop_assert!(is_safe_identifier(&name));
            prop_assert!(Identifier::parse(IdentifierKind::Table, name.clone()).is_ok());
        }

        #[test]
        fn prop_leading_digit_is_rejected(name in "[0-9][A-Za-z0-9_]{0,20}") {
            prop_assert!(!is_safe_identifier(&name));
        }

        #[test]
        fn prop_any_foreign_character_is_rejected(
            prefix in "[A-Za-z_][A-Za-z0-9_]{0,10}",
            bad in "[^A-Za-z0-9_]",
            suffix in "[A-Za-z0-9_]{0,10}",
        ) {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(!is_safe_identifier(&name));
        }
    }
}
