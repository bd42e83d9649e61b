//! Database Connection Pool Module
//!
//! PostgreSQL backend for both storage traits, using deadpool-postgres for
//! pooling. Statement text comes from `trove_storage::QueryBuilder`; this
//! module only binds parameters, executes, and decodes rows.

use std::time::{Duration, Instant};

use ::async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use trove_core::{
    ColumnData, ColumnSelection, ColumnValues, Identifier, IdentifierKind, LeaseCondition,
    LeaseMutation, LeaseRecord, RowKey, SchemaVersion, StoredRow, TroveError, TroveResult,
};
use trove_storage::{Bind, ColumnStore, LeaseStore, QueryBuilder, Statement};

use crate::config::env_setting;
use crate::constants::{
    DEFAULT_DB_HOSTS, DEFAULT_DB_NAME, DEFAULT_DB_NAMESPACE, DEFAULT_DB_POOL_SIZE,
    DEFAULT_DB_PORT, DEFAULT_DB_TIMEOUT_SECS, DEFAULT_DB_USER, DEFAULT_LEASE_TABLE,
};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL hosts, tried in order
    pub hosts: Vec<String>,
    /// PostgreSQL port
    pub port: u16,
    /// Schema holding every Trove table
    pub namespace: Identifier,
    /// Lease table name within the namespace
    pub lease_table: Identifier,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connect and pool-wait timeout
    pub timeout: Duration,
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Fails only when the namespace or lease table is not a safe
    /// identifier.
    pub fn from_env() -> ApiResult<Self> {
        let hosts: String = env_setting("TROVE_DB_HOSTS", DEFAULT_DB_HOSTS.to_string(), true);
        let namespace: String =
            env_setting("TROVE_DB_NAMESPACE", DEFAULT_DB_NAMESPACE.to_string(), true);
        let lease_table: String =
            env_setting("TROVE_LEASE_TABLE", DEFAULT_LEASE_TABLE.to_string(), false);

        Ok(Self {
            hosts: parse_hosts(&hosts),
            port: env_setting("TROVE_DB_PORT", DEFAULT_DB_PORT, true),
            namespace: Identifier::parse(IdentifierKind::Namespace, namespace)?,
            lease_table: Identifier::parse(IdentifierKind::Table, lease_table)?,
            dbname: env_setting("TROVE_DB_NAME", DEFAULT_DB_NAME.to_string(), true),
            user: env_setting("TROVE_DB_USER", DEFAULT_DB_USER.to_string(), true),
            password: std::env::var("TROVE_DB_PASSWORD").unwrap_or_default(),
            max_size: env_setting("TROVE_DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE, false),
            timeout: Duration::from_secs(env_setting(
                "TROVE_DB_TIMEOUT_SECS",
                DEFAULT_DB_TIMEOUT_SECS,
                false,
            )),
        })
    }

    /// Create a connection pool from this configuration.
    ///
    /// Connections are opened lazily, so this succeeds without a reachable
    /// database.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.hosts = Some(self.hosts.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size.max(1));
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

fn parse_hosts(raw: &str) -> Vec<String> {
    let hosts: Vec<String> = raw
        .split(',')
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();
    if hosts.is_empty() {
        vec![DEFAULT_DB_HOSTS.to_string()]
    } else {
        hosts
    }
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// Row and lease storage over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
    queries: QueryBuilder,
    lease_table: Identifier,
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: Pool, namespace: Identifier, lease_table: Identifier) -> Self {
        Self {
            pool,
            queries: QueryBuilder::new(namespace, lease_table.clone()),
            lease_table,
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(
            pool,
            config.namespace.clone(),
            config.lease_table.clone(),
        ))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the namespace and lease table if they do not exist.
    ///
    /// Row tables are owned by the games that use them and are not created
    /// here.
    pub async fn ensure_lease_table(&self) -> ApiResult<()> {
        let client = self.pool.get().await?;
        let namespace = self.queries.namespace();
        client
            .batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {namespace};
                 CREATE TABLE IF NOT EXISTS {namespace}.{table} (
                     subject_id TEXT PRIMARY KEY,
                     owner_id TEXT NOT NULL,
                     last_renewed TIMESTAMPTZ NOT NULL,
                     expires_at TIMESTAMPTZ NOT NULL
                 );",
                table = self.lease_table,
            ))
            .await?;
        tracing::info!(%namespace, table = %self.lease_table, "Lease table ready");
        Ok(())
    }

    async fn client(&self, operation: &str) -> TroveResult<Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!(operation, error = %e, "Failed to acquire database connection");
            TroveError::storage(operation, e.to_string())
        })
    }

    async fn query_opt(&self, operation: &str, stmt: &Statement<'_>) -> TroveResult<Option<Row>> {
        let client = self.client(operation).await?;
        let params = params(&stmt.binds);
        let start = Instant::now();
        let result = client.query_opt(stmt.text.as_str(), &params).await;
        tracing::debug!(
            operation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Statement executed"
        );
        result.map_err(|e| storage_failure(operation, stmt, e))
    }

    async fn query(&self, operation: &str, stmt: &Statement<'_>) -> TroveResult<Vec<Row>> {
        let client = self.client(operation).await?;
        let params = params(&stmt.binds);
        client
            .query(stmt.text.as_str(), &params)
            .await
            .map_err(|e| storage_failure(operation, stmt, e))
    }

    async fn execute(&self, operation: &str, stmt: &Statement<'_>) -> TroveResult<u64> {
        let client = self.client(operation).await?;
        let params = params(&stmt.binds);
        client
            .execute(stmt.text.as_str(), &params)
            .await
            .map_err(|e| storage_failure(operation, stmt, e))
    }
}

fn params<'s>(binds: &'s [Bind<'_>]) -> Vec<&'s (dyn ToSql + Sync)> {
    binds
        .iter()
        .map(|bind| match bind {
            Bind::Text(value) => value as &(dyn ToSql + Sync),
            Bind::Bytes(value) => value as &(dyn ToSql + Sync),
            Bind::Timestamp(value) => value as &(dyn ToSql + Sync),
        })
        .collect()
}

fn storage_failure(operation: &str, stmt: &Statement<'_>, err: tokio_postgres::Error) -> TroveError {
    tracing::error!(operation, statement = %stmt.text, error = %err, "Storage operation failed");
    TroveError::storage(operation, err.to_string())
}

fn lease_from_row(operation: &str, row: &Row) -> TroveResult<LeaseRecord> {
    let decode = || -> Result<LeaseRecord, tokio_postgres::Error> {
        Ok(LeaseRecord {
            subject_id: row.try_get(0)?,
            owner_id: row.try_get(1)?,
            last_renewed: row.try_get(2)?,
            expires_at: row.try_get(3)?,
        })
    };
    decode().map_err(|e| {
        tracing::error!(operation, error = %e, "Failed to decode lease row");
        TroveError::storage(operation, e.to_string())
    })
}

#[async_trait]
impl ColumnStore for PgStore {
    async fn save_row(
        &self,
        key: &RowKey,
        columns: &ColumnValues,
        version: &SchemaVersion,
    ) -> TroveResult<()> {
        let stmt = self.queries.upsert(key, columns, version);
        self.execute("save", &stmt).await?;
        Ok(())
    }

    async fn update_row(
        &self,
        key: &RowKey,
        columns: &ColumnValues,
        version: &SchemaVersion,
    ) -> TroveResult<u64> {
        let stmt = self.queries.update(key, columns, version);
        self.execute("update", &stmt).await
    }

    async fn load_row(&self, key: &RowKey, columns: &ColumnSelection) -> TroveResult<StoredRow> {
        let stmt = self.queries.select(key, columns);
        let rows = self.query("load", &stmt).await?;
        let row = match rows.as_slice() {
            [] => {
                return Err(TroveError::NotFound {
                    table: key.table().to_string(),
                })
            }
            [row] => row,
            _ => return Err(TroveError::ambiguous_row(key.table())),
        };

        let mut data = ColumnData::new();
        for (idx, name) in columns.columns().iter().enumerate() {
            let value: Option<Vec<u8>> = row.try_get(idx).map_err(|e| {
                tracing::error!(column = %name, error = %e, "Failed to decode column");
                TroveError::storage("load", e.to_string())
            })?;
            if let Some(value) = value {
                data.insert(name.clone(), value);
            }
        }
        let version: Option<String> = row
            .try_get(columns.columns().len())
            .map_err(|e| TroveError::storage("load", e.to_string()))?;

        Ok(StoredRow {
            columns: data,
            schema_version: version.map(SchemaVersion::new).unwrap_or_default(),
        })
    }

    async fn row_exists(&self, key: &RowKey) -> TroveResult<bool> {
        let stmt = self.queries.exists(key);
        Ok(self.query_opt("exists", &stmt).await?.is_some())
    }

    async fn ping(&self) -> TroveResult<()> {
        let client = self.client("ping").await?;
        client.simple_query("SELECT 1").await.map_err(|e| {
            tracing::warn!(error = %e, "Database ping failed");
            TroveError::storage("ping", e.to_string())
        })?;
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for PgStore {
    async fn compare_and_swap(
        &self,
        subject_id: &str,
        condition: &LeaseCondition,
        mutation: &LeaseMutation,
    ) -> TroveResult<Option<LeaseRecord>> {
        let stmt = self.queries.lease_cas(subject_id, condition, mutation)?;
        match self.query_opt("lease write", &stmt).await? {
            Some(row) => lease_from_row("lease write", &row).map(Some),
            None => Ok(None),
        }
    }

    async fn get_lease(&self, subject_id: &str) -> TroveResult<Option<LeaseRecord>> {
        let stmt = self.queries.lease_get(subject_id);
        match self.query_opt("lease read", &stmt).await? {
            Some(row) => lease_from_row("lease read", &row).map(Some),
            None => Ok(None),
        }
    }
}
