//! Traits a database driver implements to be pooled by [`ConnectionPool`](crate::ConnectionPool)
//!
//! A [`Backend`] builds a [`Driver`] (the underlying pool) from a
//! [`PoolConfig`]. The driver hands out [`DriverConnection`]s, which the
//! crate wraps in [`Connection`](crate::Connection) so they are released
//! exactly once.

use std::future::Future;

use tracing::warn;

use crate::config::{ErrorCallback, PoolConfig, TypeParsers};
use crate::connection::{Row, Statement};
use crate::error::{Cause, Error};
use crate::transaction::TransactionOptions;

/// Builds the underlying driver pool.
pub trait Backend: Send {
   type Driver: Driver;

   /// Create the driver pool.
   ///
   /// `faults` must receive every error raised by idle or background
   /// connections that is not tied to an in-flight checkout.
   fn connect(
      self,
      config: &PoolConfig,
      faults: FaultSink,
   ) -> impl Future<Output = Result<Self::Driver, Cause>> + Send;
}

/// The underlying connection pool of a database driver.
pub trait Driver: Send + Sync + 'static {
   type Connection: DriverConnection;

   /// Wait for a connection to become available.
   fn acquire(&self) -> impl Future<Output = Result<Self::Connection, Cause>> + Send;

   /// Close the pool, waiting for checked-out connections to be returned.
   fn shutdown(&self) -> impl Future<Output = Result<(), Cause>> + Send;

   /// Register decoders applied to result columns of the given types.
   fn install_type_parsers(&self, parsers: TypeParsers) -> Result<(), Cause>;
}

/// A single connection handed out by a [`Driver`].
pub trait DriverConnection: Send + 'static {
   /// Execute a parameterized statement and decode the resulting rows.
   fn query(&mut self, statement: &Statement) -> impl Future<Output = Result<Vec<Row>, Cause>> + Send;

   /// Return the connection to its pool, discarding it when `error` is set.
   fn release(self, error: Option<&Error>);

   /// Statement that opens a transaction with `options`.
   fn begin_statement(&self, options: &TransactionOptions) -> Statement {
      options.standard_begin_statement()
   }
}

/// Receives faults raised by connections that no checkout is waiting on.
///
/// Each reported fault is classified as [`Error::UnhandledPool`], logged, and
/// handed to the pool's `on_error` callback.
#[derive(Clone, Default)]
pub struct FaultSink {
   on_error: Option<ErrorCallback>,
}

impl FaultSink {
   pub(crate) fn new(on_error: Option<ErrorCallback>) -> Self {
      Self { on_error }
   }

   pub fn report(&self, cause: impl Into<Cause>) {
      let error = Error::UnhandledPool {
         cause: cause.into(),
      };

      warn!(error = %error, "Background connection fault");

      if let Some(on_error) = &self.on_error {
         on_error(error);
      }
   }
}

impl std::fmt::Debug for FaultSink {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("FaultSink")
         .field("on_error", &self.on_error.is_some())
         .finish()
   }
}
