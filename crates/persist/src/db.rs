//! Database connection and pool management.

use crate::error::{ErrorKind, Result};
use crate::executor::{Row, TransactionHandle, TransactionalExecutor, describe_parameters, tidy_sql};
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::{Number, Value};
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Column, Row as _, Sqlite, SqliteConnection, TypeInfo, ValueRef};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::instrument;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Database connection pool for the record store.
///
/// This is the production [`TransactionalExecutor`]: every call to
/// [`begin`](TransactionalExecutor::begin) checks a connection out of the
/// pool and opens a transaction on it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    transactions: Arc<AtomicU64>,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to EVERY connection the pool
            // opens, not only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self {
            pool,
            transactions: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Connect to the database at the given path with default pool settings.
    ///
    /// Creates the database file if it doesn't exist. The schema is not
    /// touched; see [`Schema::ensure`](crate::Schema::ensure).
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, MAX_CONNECTIONS, BUSY_TIMEOUT).await
    }

    /// Connect to the database at the given path.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn connect_with(path: impl AsRef<Path>, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        let options = Self::base_options(busy_timeout)
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::new(options, max_connections.max(1)).await
    }

    /// Connect to a private in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options(BUSY_TIMEOUT).filename(":memory:");
        // Parallel connections to ":memory:" would each see a different
        // database, so the pool is limited to a single connection.
        Self::new(options, 1).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options(busy_timeout: Duration) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // WAL for concurrent readers alongside the single writer.
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Startup loads and fragment clean-up can overlap; short
            // timeouts turn that overlap into SQLITE_BUSY.
            .busy_timeout(busy_timeout)
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    ///
    /// This waits for all connections to be returned to the pool and then
    /// closes them. After calling this, the Database instance should not
    /// be used.
    ///
    /// An open [`TransactionHandle`] holds its connection, so close blocks
    /// until every handle is committed or dropped.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[async_trait]
impl TransactionalExecutor for Database {
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>> {
        let id = self.transactions.fetch_add(1, Ordering::Relaxed) + 1;
        let tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        tracing::trace!(tx = id, "transaction started");
        Ok(Box::new(SqliteTransaction { id, tx }))
    }
}

/// A transaction checked out of the pool.
///
/// `sqlx` rolls the transaction back when it is dropped uncommitted.
struct SqliteTransaction {
    id: u64,
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl TransactionHandle for SqliteTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let tidy = tidy_sql(sql);
        tracing::debug!(tx = self.id, sql = %tidy, parameters = %describe_parameters(params), "executing statement");
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<i64>),
                Value::Bool(flag) => query.bind(i64::from(*flag)),
                Value::Number(number) => match number.as_i64() {
                    Some(integer) => query.bind(integer),
                    None => query.bind(number.as_f64()),
                },
                Value::String(text) => query.bind(text.clone()),
                other => query.bind(other.to_string()),
            };
        }
        let rows = query.fetch_all(&mut *self.tx).await.or_raise(|| ErrorKind::Statement {
            sql: tidy.clone(),
            parameters: describe_parameters(params),
        })?;
        tracing::trace!(tx = self.id, rows = rows.len(), "statement complete");
        rows.iter().map(decode_row).collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let id = self.id;
        self.tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        tracing::trace!(tx = id, "transaction committed");
        Ok(())
    }
}

/// Convert a row by the storage class of each value, not the declared type.
fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index).or_raise(|| ErrorKind::InvalidData("column value"))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index).or_raise(|| ErrorKind::InvalidData("integer column"))?),
                "REAL" => {
                    let real = row.try_get::<f64, _>(index).or_raise(|| ErrorKind::InvalidData("real column"))?;
                    Number::from_f64(real).map(Value::Number).unwrap_or(Value::Null)
                }
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(index).or_raise(|| ErrorKind::InvalidData("blob column"))?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(index).or_raise(|| ErrorKind::InvalidData("text column"))?),
            }
        };
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}
