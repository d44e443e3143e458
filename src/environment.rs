//! The dependency bag visible to a running program

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::connection::{Connection, Row, Statement};
use crate::driver::DriverConnection;
use crate::error::Result;

/// Dependencies handed to a program: the checked-out connection plus the
/// caller's own extension `E` (a logger, a clock, request metadata...).
///
/// The connection lives in a private field, so nothing a caller puts in `E`
/// can shadow or replace it.
pub struct Environment<'c, C: DriverConnection, E = ()> {
   connection: &'c mut Connection<C>,
   ext: E,
}

impl<'c, C: DriverConnection, E> Environment<'c, C, E> {
   pub(crate) fn new(connection: &'c mut Connection<C>, ext: E) -> Self {
      Self { connection, ext }
   }

   /// The checked-out connection.
   pub fn connection(&mut self) -> &mut Connection<C> {
      &mut *self.connection
   }

   /// The caller-supplied extension.
   pub fn ext(&self) -> &E {
      &self.ext
   }

   /// Split into the connection borrow and the extension.
   pub fn into_parts(self) -> (&'c mut Connection<C>, E) {
      (self.connection, self.ext)
   }

   /// Shorthand for `self.connection().query(..)`.
   pub async fn query(&mut self, statement: &Statement, context: JsonValue) -> Result<Vec<Row>> {
      self.connection.query(statement, context).await
   }

   /// Shorthand for `self.connection().query_as(..)`.
   pub async fn query_as<T: DeserializeOwned>(
      &mut self,
      statement: &Statement,
      context: JsonValue,
   ) -> Result<Vec<T>> {
      self.connection.query_as(statement, context).await
   }
}
