//! Error taxonomy for sqlx-conn-guard
//!
//! Every failure the crate can surface is one variant of [`Error`]. Each
//! variant records where the failure originated and keeps the underlying
//! cause reachable through [`std::error::Error::source`].

use std::any::Any;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::connection::Statement;

/// Boxed underlying cause carried by every taxonomy variant.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that may occur when working with a guarded connection pool
#[derive(Error, Debug)]
pub enum Error {
   /// Building the underlying driver pool failed
   #[error("unable to create a connection pool: {cause}")]
   PoolCreation {
      #[source]
      cause: Cause,
   },

   /// Installing column-type decoders failed
   #[error("type parser setup failed: {cause}")]
   TypeParserSetup {
      #[source]
      cause: Cause,
   },

   /// A connection could not be checked out (timeout, exhaustion, shutdown)
   #[error("unable to check out a connection from the pool: {cause}")]
   PoolCheckout {
      #[source]
      cause: Cause,
   },

   /// Graceful pool shutdown failed
   #[error("unable to shut down the connection pool: {cause}")]
   PoolShutdown {
      #[source]
      cause: Cause,
   },

   /// The driver failed while executing a statement
   #[error("query failed: {cause}")]
   DriverQuery {
      #[source]
      cause: Cause,
      statement: Statement,
      context: JsonValue,
   },

   /// A result row did not match the expected shape
   #[error("validation of a result row failed: expected {expected}")]
   RowValidation {
      expected: String,
      value: JsonValue,
      errors: Vec<String>,
      context: JsonValue,
   },

   /// A ROLLBACK issued after another failure did not complete
   #[error("a ROLLBACK was requested but not completed: {rollback}; original failure: {original}")]
   TransactionRollback {
      #[source]
      rollback: Cause,
      original: Cause,
      context: JsonValue,
   },

   /// A program faulted outside its declared failure channel
   #[error("an unhandled error was raised by a connection: {cause}")]
   UnhandledConnection {
      #[source]
      cause: Cause,
   },

   /// An idle or background connection faulted with no checkout to report to
   #[error("an unhandled error was raised by a connection pool: {cause}")]
   UnhandledPool {
      #[source]
      cause: Cause,
   },
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::PoolCreation { .. } => "POOL_CREATION_ERROR",
         Error::TypeParserSetup { .. } => "TYPE_PARSER_SETUP_ERROR",
         Error::PoolCheckout { .. } => "POOL_CHECKOUT_ERROR",
         Error::PoolShutdown { .. } => "POOL_SHUTDOWN_ERROR",
         Error::DriverQuery { .. } => "DRIVER_QUERY_ERROR",
         Error::RowValidation { .. } => "ROW_VALIDATION_ERROR",
         Error::TransactionRollback { .. } => "TRANSACTION_ROLLBACK_ERROR",
         Error::UnhandledConnection { .. } => "UNHANDLED_CONNECTION_ERROR",
         Error::UnhandledPool { .. } => "UNHANDLED_POOL_ERROR",
      }
   }

   /// Whether this is a failed ROLLBACK, leaving the connection in an unknown state.
   pub fn is_transaction_rollback(&self) -> bool {
      matches!(self, Error::TransactionRollback { .. })
   }
}

/// Full error channel of [`ConnectionPool::with_connection`](crate::ConnectionPool::with_connection):
/// the pool's own failures plus the program's declared failure type `L`.
#[derive(Error, Debug)]
pub enum ConnectionError<L> {
   /// No connection could be checked out; the program never ran
   #[error("unable to check out a connection from the pool: {cause}")]
   PoolCheckout {
      #[source]
      cause: Cause,
   },

   /// The program faulted outside its declared failure channel
   #[error("an unhandled error was raised by a connection: {cause}")]
   UnhandledConnection {
      #[source]
      cause: Cause,
   },

   /// The program's own declared failure, passed through unchanged
   #[error(transparent)]
   Program(L),
}

impl<L> ConnectionError<L> {
   /// Extract a structured error code, delegating to `L` for program failures.
   pub fn error_code(&self) -> &'static str
   where
      L: ProgramFailure,
   {
      match self {
         ConnectionError::PoolCheckout { .. } => "POOL_CHECKOUT_ERROR",
         ConnectionError::UnhandledConnection { .. } => "UNHANDLED_CONNECTION_ERROR",
         ConnectionError::Program(failure) => failure
            .as_pool_error()
            .map_or("PROGRAM_ERROR", Error::error_code),
      }
   }

   /// The program's declared failure, if that is what this is.
   pub fn into_program(self) -> Option<L> {
      match self {
         ConnectionError::Program(failure) => Some(failure),
         _ => None,
      }
   }
}

impl<L: Into<Error>> From<ConnectionError<L>> for Error {
   fn from(err: ConnectionError<L>) -> Self {
      match err {
         ConnectionError::PoolCheckout { cause } => Error::PoolCheckout { cause },
         ConnectionError::UnhandledConnection { cause } => Error::UnhandledConnection { cause },
         ConnectionError::Program(failure) => failure.into(),
      }
   }
}

/// Lets the execution engine see which taxonomy error, if any, a program's
/// declared failure carries. Release health is decided from it.
pub trait ProgramFailure {
   fn as_pool_error(&self) -> Option<&Error> {
      None
   }
}

impl ProgramFailure for Error {
   fn as_pool_error(&self) -> Option<&Error> {
      Some(self)
   }
}

impl<L: ProgramFailure> ProgramFailure for ConnectionError<L> {
   fn as_pool_error(&self) -> Option<&Error> {
      match self {
         ConnectionError::Program(failure) => failure.as_pool_error(),
         _ => None,
      }
   }
}

impl ProgramFailure for std::convert::Infallible {}

/// Conditions detected by this crate itself, used as the cause of a taxonomy variant.
#[derive(Error, Debug)]
pub enum Fault {
   /// The pool has been asked to shut down
   #[error("the connection pool is ending")]
   PoolEnding,

   /// Checkout did not complete within the configured acquire timeout
   #[error("timed out after {0:?} waiting for a connection")]
   AcquireTimeout(Duration),

   /// A program panicked while holding a connection
   #[error("program panicked: {0}")]
   Panic(String),

   /// A type parser was registered for a column type the driver does not know
   #[error("unknown column type '{0}'")]
   UnknownColumnType(String),

   /// Type parsers were already installed on this pool
   #[error("type parsers have already been installed")]
   TypeParsersInstalled,

   /// The connection was dropped while still checked out
   #[error("connection was dropped without being released")]
   ConnectionAbandoned,
}

impl Fault {
   pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
      let message = if let Some(message) = payload.downcast_ref::<&str>() {
         (*message).to_string()
      } else if let Some(message) = payload.downcast_ref::<String>() {
         message.clone()
      } else {
         "non-string panic payload".to_string()
      };
      Fault::Panic(message)
   }
}
