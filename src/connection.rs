//! Uniform wrapper over a single checked-out driver connection

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use crate::driver::DriverConnection;
use crate::error::{Error, Fault, Result};
use crate::transaction::TransactionOptions;
use crate::validate::decode_rows;

/// A decoded result row, column order preserved.
pub type Row = IndexMap<String, JsonValue>;

/// Statement with query text and bind values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
   pub query: String,
   pub values: Vec<JsonValue>,
}

impl Statement {
   pub fn new(query: impl Into<String>) -> Self {
      Self {
         query: query.into(),
         values: Vec::new(),
      }
   }

   /// Append a bind value for the next positional parameter
   pub fn bind(mut self, value: impl Into<JsonValue>) -> Self {
      self.values.push(value.into());
      self
   }
}

/// One exclusively owned, checked-out connection.
///
/// Queries go through [`query`](Self::query); the connection goes back to the
/// pool through [`release`](Self::release), which consumes the wrapper so it
/// can only happen once. A wrapper dropped while still holding its handle
/// releases it as unhealthy, since whatever it was doing never finished.
pub struct Connection<C: DriverConnection> {
   handle: Option<C>,
}

impl<C: DriverConnection> Connection<C> {
   pub(crate) fn new(handle: C) -> Self {
      Self {
         handle: Some(handle),
      }
   }

   /// Execute a statement and return the raw rows.
   ///
   /// Driver failures are wrapped as [`Error::DriverQuery`] together with the
   /// statement and `context`. The context is only carried along for
   /// diagnostics.
   pub async fn query(&mut self, statement: &Statement, context: JsonValue) -> Result<Vec<Row>> {
      trace!(query = %statement.query, binds = statement.values.len(), "Executing statement");

      self
         .handle_mut()
         .query(statement)
         .await
         .map_err(|cause| Error::DriverQuery {
            cause,
            statement: statement.clone(),
            context,
         })
   }

   /// Execute a statement and deserialize every row into `T`.
   pub async fn query_as<T: DeserializeOwned>(
      &mut self,
      statement: &Statement,
      context: JsonValue,
   ) -> Result<Vec<T>> {
      let rows = self.query(statement, context.clone()).await?;
      decode_rows(rows, &context)
   }

   /// The statement this connection's driver uses to open a transaction.
   pub fn begin_statement(&self, options: &TransactionOptions) -> Statement {
      self.handle().begin_statement(options)
   }

   // Only `release` and `Drop` take the handle, and both end the wrapper
   fn handle(&self) -> &C {
      self
         .handle
         .as_ref()
         .expect("connection handle is held until release")
   }

   fn handle_mut(&mut self) -> &mut C {
      self
         .handle
         .as_mut()
         .expect("connection handle is held until release")
   }

   /// Return the connection to the pool.
   ///
   /// With an error attached, the driver is told the connection is unhealthy
   /// and must be discarded or reset rather than reused.
   pub fn release(mut self, error: Option<&Error>) {
      if let Some(handle) = self.handle.take() {
         handle.release(error);
      }
   }
}

impl<C: DriverConnection> std::fmt::Debug for Connection<C> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Connection").finish_non_exhaustive()
   }
}

impl<C: DriverConnection> Drop for Connection<C> {
   fn drop(&mut self) {
      if let Some(handle) = self.handle.take() {
         warn!("Connection dropped while checked out, releasing as unhealthy");
         let error = Error::UnhandledConnection {
            cause: Box::new(Fault::ConnectionAbandoned),
         };
         handle.release(Some(&error));
      }
   }
}
