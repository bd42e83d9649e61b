//! Statement construction.
//!
//! Pure functions from validated types to statement text plus ordered bind
//! values. Identifiers are the only thing ever interpolated into the text;
//! every value travels as a positional parameter.

use trove_core::{
    ColumnSelection, ColumnValues, Identifier, LeaseCondition, LeaseMutation, RowKey,
    SchemaVersion, Timestamp, TroveError, TroveResult, SCHEMA_VERSION_COLUMN,
};

/// Columns of the lease table, in the order every lease statement returns
/// them.
pub const LEASE_COLUMNS: &str = "subject_id, owner_id, last_renewed, expires_at";

/// A positional parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bind<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
    Timestamp(Timestamp),
}

/// Statement text plus the values for `$1..$n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement<'a> {
    pub text: String,
    pub binds: Vec<Bind<'a>>,
}

impl<'a> Statement<'a> {
    fn new() -> Self {
        Self {
            text: String::new(),
            binds: Vec::new(),
        }
    }

    /// Push a bind value and return its placeholder.
    fn bind(&mut self, value: Bind<'a>) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }
}

/// Builds statements against one namespace (schema).
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    namespace: Identifier,
    lease_table: Identifier,
}

impl QueryBuilder {
    pub fn new(namespace: Identifier, lease_table: Identifier) -> Self {
        Self {
            namespace,
            lease_table,
        }
    }

    pub fn namespace(&self) -> &Identifier {
        &self.namespace
    }

    fn qualified(&self, table: &Identifier) -> String {
        format!("{}.{}", self.namespace, table)
    }

    fn where_super_keys<'a>(stmt: &mut Statement<'a>, key: &'a RowKey) -> String {
        key.super_keys()
            .iter()
            .map(|(name, value)| {
                let placeholder = stmt.bind(Bind::Text(value));
                format!("{name} = {placeholder}")
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// `INSERT ... ON CONFLICT (super keys) DO UPDATE` setting every given
    /// column and the schema version.
    pub fn upsert<'a>(
        &self,
        key: &'a RowKey,
        columns: &'a ColumnValues,
        version: &'a SchemaVersion,
    ) -> Statement<'a> {
        let mut stmt = Statement::new();
        let mut names: Vec<&str> = Vec::new();
        let mut placeholders: Vec<String> = Vec::new();

        for (name, value) in key.super_keys() {
            names.push(name.as_str());
            placeholders.push(stmt.bind(Bind::Text(value)));
        }
        for (name, value) in columns.as_map() {
            names.push(name.as_str());
            placeholders.push(stmt.bind(Bind::Bytes(value)));
        }
        names.push(SCHEMA_VERSION_COLUMN);
        placeholders.push(stmt.bind(Bind::Text(version.as_str())));

        let conflict = key
            .super_keys()
            .keys()
            .map(Identifier::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let updates = columns
            .as_map()
            .keys()
            .map(Identifier::as_str)
            .chain(std::iter::once(SCHEMA_VERSION_COLUMN))
            .map(|name| format!("{name} = EXCLUDED.{name}"))
            .collect::<Vec<_>>()
            .join(", ");

        stmt.text = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            self.qualified(key.table()),
            names.join(", "),
            placeholders.join(", "),
            conflict,
            updates,
        );
        stmt
    }

    /// `UPDATE ... SET` every given column and the schema version on the
    /// rows matching the super-key. Never inserts.
    pub fn update<'a>(
        &self,
        key: &'a RowKey,
        columns: &'a ColumnValues,
        version: &'a SchemaVersion,
    ) -> Statement<'a> {
        let mut stmt = Statement::new();
        let mut assignments: Vec<String> = columns
            .as_map()
            .iter()
            .map(|(name, value)| format!("{name} = {}", stmt.bind(Bind::Bytes(value))))
            .collect();
        assignments.push(format!(
            "{SCHEMA_VERSION_COLUMN} = {}",
            stmt.bind(Bind::Text(version.as_str()))
        ));
        let predicate = Self::where_super_keys(&mut stmt, key);
        stmt.text = format!(
            "UPDATE {} SET {} WHERE {}",
            self.qualified(key.table()),
            assignments.join(", "),
            predicate,
        );
        stmt
    }

    /// Select the requested columns plus the schema version. Two rows at
    /// most, so the caller can tell a unique match from an ambiguous one.
    pub fn select<'a>(&self, key: &'a RowKey, columns: &ColumnSelection) -> Statement<'a> {
        let mut stmt = Statement::new();
        let selected = columns
            .columns()
            .iter()
            .map(Identifier::as_str)
            .chain(std::iter::once(SCHEMA_VERSION_COLUMN))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = Self::where_super_keys(&mut stmt, key);
        stmt.text = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 2",
            selected,
            self.qualified(key.table()),
            predicate,
        );
        stmt
    }

    pub fn exists<'a>(&self, key: &'a RowKey) -> Statement<'a> {
        let mut stmt = Statement::new();
        let predicate = Self::where_super_keys(&mut stmt, key);
        stmt.text = format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            self.qualified(key.table()),
            predicate,
        );
        stmt
    }

    pub fn lease_get<'a>(&self, subject_id: &'a str) -> Statement<'a> {
        let mut stmt = Statement::new();
        let subject = stmt.bind(Bind::Text(subject_id));
        stmt.text = format!(
            "SELECT {LEASE_COLUMNS} FROM {} WHERE subject_id = {subject}",
            self.qualified(&self.lease_table),
        );
        stmt
    }

    /// Conditional lease write. Every statement ends in `RETURNING` the
    /// lease columns, so "applied" is exactly "returned a row".
    pub fn lease_cas<'a>(
        &self,
        subject_id: &'a str,
        condition: &'a LeaseCondition,
        mutation: &'a LeaseMutation,
    ) -> TroveResult<Statement<'a>> {
        check_lease_pair(condition, mutation)?;
        let table = self.qualified(&self.lease_table);
        let mut stmt = Statement::new();
        let subject = stmt.bind(Bind::Text(subject_id));

        let head = match mutation {
            LeaseMutation::Insert(record) => {
                let owner = stmt.bind(Bind::Text(&record.owner_id));
                let renewed = stmt.bind(Bind::Timestamp(record.last_renewed));
                let expires = stmt.bind(Bind::Timestamp(record.expires_at));
                stmt.text = format!(
                    "INSERT INTO {table} ({LEASE_COLUMNS}) VALUES ({subject}, {owner}, {renewed}, {expires}) \
                     ON CONFLICT (subject_id) DO NOTHING RETURNING {LEASE_COLUMNS}"
                );
                return Ok(stmt);
            }
            LeaseMutation::Refresh {
                last_renewed,
                expires_at,
            } => {
                let renewed = stmt.bind(Bind::Timestamp(*last_renewed));
                let expires = stmt.bind(Bind::Timestamp(*expires_at));
                format!(
                    "UPDATE {table} SET last_renewed = {renewed}, \
                     expires_at = GREATEST(expires_at, {expires})"
                )
            }
            LeaseMutation::Reassign(record) => {
                let owner = stmt.bind(Bind::Text(&record.owner_id));
                let renewed = stmt.bind(Bind::Timestamp(record.last_renewed));
                let expires = stmt.bind(Bind::Timestamp(record.expires_at));
                format!(
                    "UPDATE {table} SET owner_id = {owner}, last_renewed = {renewed}, \
                     expires_at = {expires}"
                )
            }
            LeaseMutation::Delete => format!("DELETE FROM {table}"),
        };

        let guard = match condition {
            LeaseCondition::OwnedBy(owner) => {
                format!("owner_id = {}", stmt.bind(Bind::Text(owner)))
            }
            LeaseCondition::ExpiredBefore(now) => {
                format!("expires_at < {}", stmt.bind(Bind::Timestamp(*now)))
            }
            LeaseCondition::Absent => return Err(unsupported_pair(condition, mutation)),
        };

        stmt.text = format!(
            "{head} WHERE subject_id = {subject} AND {guard} RETURNING {LEASE_COLUMNS}"
        );
        Ok(stmt)
    }
}

/// `Insert` is only meaningful against an absent row, and an absent row
/// can only be inserted.
pub fn check_lease_pair(condition: &LeaseCondition, mutation: &LeaseMutation) -> TroveResult<()> {
    let inserting = matches!(mutation, LeaseMutation::Insert(_));
    let absent = matches!(condition, LeaseCondition::Absent);
    if inserting != absent {
        return Err(unsupported_pair(condition, mutation));
    }
    Ok(())
}

fn unsupported_pair(condition: &LeaseCondition, mutation: &LeaseMutation) -> TroveError {
    TroveError::invalid_request(format!(
        "unsupported lease write: {condition:?} with {}",
        mutation_name(mutation)
    ))
}

fn mutation_name(mutation: &LeaseMutation) -> &'static str {
    match mutation {
        LeaseMutation::Insert(_) => "insert",
        LeaseMutation::Refresh { .. } => "refresh",
        LeaseMutation::Reassign(_) => "reassign",
        LeaseMutation::Delete => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use trove_core::{IdentifierKind, LeaseRecord};

    fn builder() -> QueryBuilder {
        QueryBuilder::new(
            Identifier::parse(IdentifierKind::Namespace, "trove").unwrap(),
            Identifier::parse(IdentifierKind::Table, "user_locks").unwrap(),
        )
    }

    fn key() -> RowKey {
        RowKey::new("players", [("user_id", "u1"), ("slot", "2")]).unwrap()
    }

    #[test]
    fn test_upsert_text_and_binds() {
        let key = key();
        let columns = ColumnValues::new(&key, [("data", vec![1u8]), ("bank", vec![2u8])]).unwrap();
        let version = SchemaVersion::from("v3");
        let stmt = builder().upsert(&key, &columns, &version);

        assert_eq!(
            stmt.text,
            "INSERT INTO trove.players (slot, user_id, bank, data, schema_version) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (slot, user_id) DO UPDATE SET \
             bank = EXCLUDED.bank, data = EXCLUDED.data, schema_version = EXCLUDED.schema_version"
        );
        assert_eq!(
            stmt.binds,
            vec![
                Bind::Text("2"),
                Bind::Text("u1"),
                Bind::Bytes(&[2]),
                Bind::Bytes(&[1]),
                Bind::Text("v3"),
            ]
        );
    }

    #[test]
    fn test_select_and_exists() {
        let key = key();
        let selection = ColumnSelection::new(&key, ["data"]).unwrap();
        let stmt = builder().select(&key, &selection);
        assert_eq!(
            stmt.text,
            "SELECT data, schema_version FROM trove.players WHERE slot = $1 AND user_id = $2 LIMIT 2"
        );
        assert_eq!(stmt.binds, vec![Bind::Text("2"), Bind::Text("u1")]);

        let stmt = builder().exists(&key);
        assert_eq!(
            stmt.text,
            "SELECT 1 FROM trove.players WHERE slot = $1 AND user_id = $2 LIMIT 1"
        );
    }

    #[test]
    fn test_update_never_inserts() {
        let key = RowKey::new("players", [("user_id", "u1")]).unwrap();
        let columns = ColumnValues::new(&key, [("bank", vec![7u8])]).unwrap();
        let version = SchemaVersion::from("v2");
        let stmt = builder().update(&key, &columns, &version);
        assert_eq!(
            stmt.text,
            "UPDATE trove.players SET bank = $1, schema_version = $2 WHERE user_id = $3"
        );
        assert_eq!(
            stmt.binds,
            vec![Bind::Bytes(&[7]), Bind::Text("v2"), Bind::Text("u1")]
        );
    }

    #[test]
    fn test_hostile_values_stay_in_binds() {
        let hostile = "u1' OR '1'='1";
        let key = RowKey::new("players", [("user_id", hostile)]).unwrap();
        let stmt = builder().exists(&key);
        assert!(!stmt.text.contains(hostile));
        assert_eq!(stmt.binds, vec![Bind::Text(hostile)]);
    }

    #[test]
    fn test_lease_statements() {
        let now = Utc.timestamp_millis_opt(1_000).unwrap();
        let later = Utc.timestamp_millis_opt(6_000).unwrap();
        let record = LeaseRecord {
            subject_id: "u1".to_string(),
            owner_id: "s1".to_string(),
            last_renewed: now,
            expires_at: later,
        };

        let insert = LeaseMutation::Insert(record.clone());
        let stmt = builder()
            .lease_cas("u1", &LeaseCondition::Absent, &insert)
            .unwrap();
        assert!(stmt.text.starts_with("INSERT INTO trove.user_locks"));
        assert!(stmt.text.contains("ON CONFLICT (subject_id) DO NOTHING"));
        assert_eq!(stmt.binds.len(), 4);

        let refresh = LeaseMutation::Refresh {
            last_renewed: now,
            expires_at: later,
        };
        let owned = LeaseCondition::OwnedBy("s1".to_string());
        let stmt = builder().lease_cas("u1", &owned, &refresh).unwrap();
        assert_eq!(
            stmt.text,
            "UPDATE trove.user_locks SET last_renewed = $2, expires_at = GREATEST(expires_at, $3) \
             WHERE subject_id = $1 AND owner_id = $4 RETURNING subject_id, owner_id, last_renewed, expires_at"
        );

        let expired = LeaseCondition::ExpiredBefore(now);
        let reassign = LeaseMutation::Reassign(record);
        let stmt = builder().lease_cas("u1", &expired, &reassign).unwrap();
        assert!(stmt.text.contains("WHERE subject_id = $1 AND expires_at < $5"));

        let stmt = builder()
            .lease_cas("u1", &owned, &LeaseMutation::Delete)
            .unwrap();
        assert_eq!(
            stmt.text,
            "DELETE FROM trove.user_locks WHERE subject_id = $1 AND owner_id = $2 \
             RETURNING subject_id, owner_id, last_renewed, expires_at"
        );
    }

    #[test]
    fn test_lease_pairs_are_checked() {
        assert!(check_lease_pair(&LeaseCondition::Absent, &LeaseMutation::Delete).is_err());
        let record = LeaseRecord {
            subject_id: "u1".to_string(),
            owner_id: "s1".to_string(),
            last_renewed: Utc::now(),
            expires_at: Utc::now(),
        };
        assert!(check_lease_pair(
            &LeaseCondition::OwnedBy("s1".to_string()),
            &LeaseMutation::Insert(record)
        )
        .is_err());
    }
}
