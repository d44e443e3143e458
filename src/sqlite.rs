//! SQLite driver built on SQLx's connection pool
//!
//! ## Design Principles
//!
//! - Uses sqlx's `SqlitePoolOptions` for all pool configuration
//! - Uses sqlx's `SqliteConnectOptions`, parsed from [`PoolConfig::url`]
//! - Idle connections are pinged before being handed out; a failed ping is
//!   reported as a background fault and the connection is dropped from the pool
//! - Unhealthy releases detach the connection from the pool and close it

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use serde_json::Value as JsonValue;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection as _, Pool, Sqlite};
use tracing::debug;

use crate::config::{PoolConfig, TypeParsers};
use crate::connection::{Row, Statement};
use crate::decode::decode_row;
use crate::driver::{Backend, Driver, DriverConnection, FaultSink};
use crate::error::{Cause, Error, Fault, Result};
use crate::pool::ConnectionPool;
use crate::transaction::TransactionOptions;

/// Column type names SQLx reports for SQLite columns; type parsers must use one of these.
const COLUMN_TYPES: [&str; 10] = [
   "NULL", "TEXT", "REAL", "BLOB", "INTEGER", "NUMERIC", "BOOLEAN", "DATE", "TIME", "DATETIME",
];

/// A guarded pool over SQLite.
pub type SqlitePool = ConnectionPool<SqliteDriver>;

/// Create a guarded SQLite pool from `config`.
///
/// `config.url` accepts anything `SqliteConnectOptions` parses, e.g.
/// `sqlite://path/to/app.db` or `sqlite::memory:`. Missing database files
/// are created and WAL journaling is enabled.
pub async fn connect(config: PoolConfig) -> Result<SqlitePool> {
   ConnectionPool::create(SqliteBackend, config).await
}

/// [`Backend`] building a [`SqliteDriver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

impl Backend for SqliteBackend {
   type Driver = SqliteDriver;

   async fn connect(
      self,
      config: &PoolConfig,
      faults: FaultSink,
   ) -> std::result::Result<SqliteDriver, Cause> {
      let options = SqliteConnectOptions::from_str(&config.url)?
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal);

      let pool = SqlitePoolOptions::new()
         .min_connections(config.min_connections)
         .max_connections(config.max_connections)
         .idle_timeout(config.idle_timeout)
         .acquire_timeout(config.acquire_timeout)
         .before_acquire(move |conn, meta| {
            let faults = faults.clone();
            Box::pin(async move {
               match conn.ping().await {
                  Ok(()) => Ok(true),
                  Err(err) => {
                     debug!(idle_for = ?meta.idle_for, "Idle connection failed health check");
                     faults.report(err);
                     Ok(false)
                  }
               }
            })
         })
         .connect_with(options)
         .await?;

      debug!(url = %config.url, "SQLite pool connected");

      Ok(SqliteDriver {
         pool,
         parsers: Arc::new(OnceLock::new()),
      })
   }
}

/// The SQLx pool underneath a [`SqlitePool`].
pub struct SqliteDriver {
   pool: Pool<Sqlite>,
   parsers: Arc<OnceLock<TypeParsers>>,
}

impl SqliteDriver {
   /// The raw SQLx pool, for work that does not need guarded release.
   pub fn pool(&self) -> &Pool<Sqlite> {
      &self.pool
   }
}

impl Driver for SqliteDriver {
   type Connection = SqliteConnectionHandle;

   async fn acquire(&self) -> std::result::Result<SqliteConnectionHandle, Cause> {
      let conn = self.pool.acquire().await?;
      Ok(SqliteConnectionHandle {
         conn,
         parsers: Arc::clone(&self.parsers),
      })
   }

   async fn shutdown(&self) -> std::result::Result<(), Cause> {
      self.pool.close().await;
      debug!("SQLite pool closed");
      Ok(())
   }

   fn install_type_parsers(&self, parsers: TypeParsers) -> std::result::Result<(), Cause> {
      let mut normalized = TypeParsers::with_capacity(parsers.len());

      for (column_type, parser) in parsers {
         let name = column_type.trim().to_ascii_uppercase();
         if !COLUMN_TYPES.contains(&name.as_str()) {
            return Err(Box::new(Fault::UnknownColumnType(column_type)));
         }
         normalized.insert(name, parser);
      }

      self
         .parsers
         .set(normalized)
         .map_err(|_| Box::new(Fault::TypeParsersInstalled) as Cause)
   }
}

impl std::fmt::Debug for SqliteDriver {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("SqliteDriver")
         .field("pool", &self.pool)
         .field("type_parsers", &self.parsers.get().map(|p| p.len()))
         .finish()
   }
}

/// One checked-out SQLite connection.
pub struct SqliteConnectionHandle {
   conn: PoolConnection<Sqlite>,
   parsers: Arc<OnceLock<TypeParsers>>,
}

impl DriverConnection for SqliteConnectionHandle {
   async fn query(&mut self, statement: &Statement) -> std::result::Result<Vec<Row>, Cause> {
      let mut q = sqlx::query(&statement.query);
      for value in &statement.values {
         q = bind_value(q, value.clone());
      }

      let rows = q.fetch_all(&mut *self.conn).await?;

      let parsers = self.parsers.get();
      rows.iter().map(|row| decode_row(row, parsers)).collect()
   }

   fn release(self, error: Option<&Error>) {
      match error {
         Some(error) => {
            debug!(code = error.error_code(), "Discarding unhealthy SQLite connection");
            // Detached connections no longer count against the pool and close on drop
            drop(self.conn.detach());
         }
         None => drop(self.conn),
      }
   }

   /// SQLite has no isolation levels; read-only transactions defer taking
   /// the write lock, everything else takes it up front.
   fn begin_statement(&self, options: &TransactionOptions) -> Statement {
      if options.read_only {
         Statement::new("BEGIN DEFERRED")
      } else {
         Statement::new("BEGIN IMMEDIATE")
      }
   }
}

/// Helper function to bind a JSON value to a SQLx query
fn bind_value<'q>(
   query: Query<'q, Sqlite, SqliteArguments<'q>>,
   value: JsonValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
   match value {
      JsonValue::Null => query.bind(None::<JsonValue>),
      JsonValue::String(text) => query.bind(text),
      JsonValue::Bool(flag) => query.bind(flag),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Too large for SQLite's INTEGER, use f64 (will lose precision)
            query.bind(uint_val as f64)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      other => query.bind(other),
   }
}
