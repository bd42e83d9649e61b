//! Row model: validated row keys, column sets and schema versions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{TroveError, TroveResult};
use crate::identifier::{Identifier, IdentifierKind};

/// Name of the column every row table carries alongside its data columns.
pub const SCHEMA_VERSION_COLUMN: &str = "schema_version";

/// Opaque schema version tag. Versions are compared for equality only;
/// no ordering between them is assumed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaVersion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SchemaVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Column name → opaque blob.
pub type ColumnData = BTreeMap<Identifier, Vec<u8>>;

/// A table plus the super-key identifying one row in it.
///
/// Super-keys are kept sorted so statements built from the same request
/// are textually identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    table: Identifier,
    super_keys: BTreeMap<Identifier, String>,
}

impl RowKey {
    /// Validate the table and every super-key column name.
    pub fn new<I, K, V>(table: &str, super_keys: I) -> TroveResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if table.is_empty() {
            return Err(TroveError::invalid_request("missing required fields: table"));
        }
        let table = Identifier::parse(IdentifierKind::Table, table)?;

        let mut keys = BTreeMap::new();
        for (name, value) in super_keys {
            let name = Identifier::parse(IdentifierKind::SuperKey, name)?;
            keys.insert(name, value.into());
        }
        if keys.is_empty() {
            return Err(TroveError::invalid_request(
                "must specify at least one superkey",
            ));
        }

        Ok(Self {
            table,
            super_keys: keys,
        })
    }

    pub fn table(&self) -> &Identifier {
        &self.table
    }

    pub fn super_keys(&self) -> &BTreeMap<Identifier, String> {
        &self.super_keys
    }

    /// True when every super-key pair of `self` appears in `keys`.
    pub fn matches(&self, keys: &BTreeMap<Identifier, String>) -> bool {
        self.super_keys
            .iter()
            .all(|(name, value)| keys.get(name) == Some(value))
    }
}

/// Column values to write. Never empty, never touches the reserved
/// version column or a super-key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValues(ColumnData);

impl ColumnValues {
    pub fn new<I, K>(key: &RowKey, columns: I) -> TroveResult<Self>
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        let mut data = ColumnData::new();
        for (name, value) in columns {
            let name = parse_data_column(key, name)?;
            data.insert(name, value);
        }
        Self::from_data(data)
    }

    /// Wrap already-validated columns, e.g. the output of a migration.
    pub fn from_data(data: ColumnData) -> TroveResult<Self> {
        if data.is_empty() {
            return Err(TroveError::invalid_request(
                "must specify at least one column",
            ));
        }
        Ok(Self(data))
    }

    pub fn as_map(&self) -> &ColumnData {
        &self.0
    }

    pub fn into_map(self) -> ColumnData {
        self.0
    }
}

/// Columns to read. Never empty; duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection(Vec<Identifier>);

impl ColumnSelection {
    pub fn new<I, K>(key: &RowKey, columns: I) -> TroveResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut selected: Vec<Identifier> = Vec::new();
        for name in columns {
            let name = parse_data_column(key, name)?;
            if !selected.contains(&name) {
                selected.push(name);
            }
        }
        if selected.is_empty() {
            return Err(TroveError::invalid_request(
                "must specify at least one column to select",
            ));
        }
        Ok(Self(selected))
    }

    pub fn columns(&self) -> &[Identifier] {
        &self.0
    }
}

fn parse_data_column(key: &RowKey, name: impl Into<String>) -> TroveResult<Identifier> {
    let name = Identifier::parse(IdentifierKind::Column, name)?;
    if name.as_str() == SCHEMA_VERSION_COLUMN {
        return Err(TroveError::invalid_request(format!(
            "column name {SCHEMA_VERSION_COLUMN} is reserved"
        )));
    }
    if key.super_keys.contains_key(&name) {
        return Err(TroveError::invalid_request(format!(
            "column {name} is part of the super key"
        )));
    }
    Ok(name)
}

/// A row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Requested columns that hold a value. Null columns are omitted.
    pub columns: ColumnData,
    pub schema_version: SchemaVersion,
}
