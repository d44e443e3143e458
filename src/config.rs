//! Configuration for guarded connection pools

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::Error;

/// Callback receiving [`Error::UnhandledPool`] faults from idle connections.
pub type ErrorCallback = Arc<dyn Fn(Error) + Send + Sync>;

/// Decoder applied to the text form of a column value.
pub type TypeParser = Arc<dyn Fn(&str) -> JsonValue + Send + Sync>;

/// Column type name to decoder.
pub type TypeParsers = HashMap<String, TypeParser>;

/// Decides which program failures leave a connection too suspect to reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReleasePolicy {
   /// Only a failed ROLLBACK marks the connection unhealthy.
   #[default]
   DiscardOnRollbackFailure,

   /// A failed ROLLBACK or any driver-level query failure marks the
   /// connection unhealthy.
   DiscardOnDatabaseFailure,
}

impl ReleasePolicy {
   /// Whether a program failing with `error` should release its connection unhealthy.
   pub fn discards(&self, error: &Error) -> bool {
      match self {
         ReleasePolicy::DiscardOnRollbackFailure => error.is_transaction_rollback(),
         ReleasePolicy::DiscardOnDatabaseFailure => {
            matches!(
               error,
               Error::TransactionRollback { .. } | Error::DriverQuery { .. }
            )
         }
      }
   }
}

/// Configuration for [`ConnectionPool`](crate::ConnectionPool)
///
/// # Examples
///
/// ```
/// use sqlx_conn_guard::PoolConfig;
/// use std::time::Duration;
///
/// // Override just a few fields
/// let config = PoolConfig {
///    url: "sqlite://app.db".into(),
///    max_connections: 4,
///    acquire_timeout: Duration::from_secs(5),
///    ..Default::default()
/// };
///
/// // Or use the helpers
/// let config = PoolConfig::new("sqlite://app.db")
///    .with_on_error(|err| eprintln!("pool fault: {err}"))
///    .with_type_parser("BOOLEAN", |text| serde_json::Value::Bool(text == "1"));
/// ```
#[derive(Clone)]
pub struct PoolConfig {
   /// Connection string understood by the driver
   pub url: String,

   /// Connections kept open even when idle
   ///
   /// Default: 0
   pub min_connections: u32,

   /// Upper bound on open connections; checkouts beyond it wait
   ///
   /// Default: 10
   pub max_connections: u32,

   /// Idle connections older than this are closed. `None` keeps them forever.
   ///
   /// Default: 10 seconds
   pub idle_timeout: Option<Duration>,

   /// How long a checkout may wait for a connection before failing
   ///
   /// Default: 30 seconds
   pub acquire_timeout: Duration,

   /// Receives faults from idle connections. Faults are logged either way.
   pub on_error: Option<ErrorCallback>,

   /// Optional decoders keyed by column type name
   pub type_parsers: Option<TypeParsers>,

   /// Which program failures release their connection unhealthy
   pub release_policy: ReleasePolicy,
}

impl PoolConfig {
   pub fn new(url: impl Into<String>) -> Self {
      Self {
         url: url.into(),
         ..Default::default()
      }
   }

   pub fn with_on_error(mut self, on_error: impl Fn(Error) + Send + Sync + 'static) -> Self {
      self.on_error = Some(Arc::new(on_error));
      self
   }

   pub fn with_type_parser(
      mut self,
      column_type: impl Into<String>,
      parser: impl Fn(&str) -> JsonValue + Send + Sync + 'static,
   ) -> Self {
      self
         .type_parsers
         .get_or_insert_with(HashMap::new)
         .insert(column_type.into(), Arc::new(parser));
      self
   }
}

impl Default for PoolConfig {
   fn default() -> Self {
      Self {
         url: String::new(),
         min_connections: 0,
         max_connections: 10,
         idle_timeout: Some(Duration::from_secs(10)),
         acquire_timeout: Duration::from_secs(30),
         on_error: None,
         type_parsers: None,
         release_policy: ReleasePolicy::default(),
      }
   }
}

impl std::fmt::Debug for PoolConfig {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      let parser_types: Option<Vec<&String>> = self
         .type_parsers
         .as_ref()
         .map(|parsers| parsers.keys().collect());

      f.debug_struct("PoolConfig")
         .field("url", &self.url)
         .field("min_connections", &self.min_connections)
         .field("max_connections", &self.max_connections)
         .field("idle_timeout", &self.idle_timeout)
         .field("acquire_timeout", &self.acquire_timeout)
         .field("on_error", &self.on_error.is_some())
         .field("type_parsers", &parser_types)
         .field("release_policy", &self.release_policy)
         .finish()
   }
}
