//! Transactions over a checked-out connection

use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::connection::{Connection, Statement};
use crate::driver::DriverConnection;
use crate::error::{Cause, Error, Fault};

/// SQL transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
   ReadUncommitted,
   ReadCommitted,
   RepeatableRead,
   Serializable,
}

impl IsolationLevel {
   pub fn as_sql(&self) -> &'static str {
      match self {
         IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
         IsolationLevel::ReadCommitted => "READ COMMITTED",
         IsolationLevel::RepeatableRead => "REPEATABLE READ",
         IsolationLevel::Serializable => "SERIALIZABLE",
      }
   }
}

/// Options used to open a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionOptions {
   /// Carried into every error raised by the transaction, for diagnostics
   pub context: JsonValue,
   /// `None` uses the server default
   pub isolation: Option<IsolationLevel>,
   pub read_only: bool,
   pub deferrable: bool,
}

impl TransactionOptions {
   /// `BEGIN` with standard SQL transaction modes appended.
   pub fn standard_begin_statement(&self) -> Statement {
      let mut query = String::from("BEGIN");
      if let Some(isolation) = self.isolation {
         query.push_str(" ISOLATION LEVEL ");
         query.push_str(isolation.as_sql());
      }
      if self.read_only {
         query.push_str(" READ ONLY");
      }
      if self.deferrable {
         query.push_str(" DEFERRABLE");
      }
      Statement::new(query)
   }
}

/// Run `body` inside a transaction on `connection`.
///
/// This function:
/// 1. Begins a transaction (statement chosen by the driver)
/// 2. Runs `body`
/// 3. Commits on success (COMMIT)
/// 4. Rolls back on failure (ROLLBACK) and returns the original failure
///
/// A failed COMMIT and a panic inside `body` are rolled back the same way;
/// the COMMIT error is returned and the panic resumes once the ROLLBACK
/// has completed.
///
/// If the ROLLBACK itself fails the result is [`Error::TransactionRollback`],
/// carrying both the rollback failure and the original one. The execution
/// engine releases a connection that failed this way as unhealthy.
pub async fn transaction<C, A, L, F>(
   connection: &mut Connection<C>,
   options: &TransactionOptions,
   body: F,
) -> Result<A, L>
where
   C: DriverConnection,
   L: From<Error> + std::error::Error + Send + Sync + 'static,
   F: for<'t> FnOnce(&'t mut Connection<C>) -> BoxFuture<'t, Result<A, L>>,
{
   let context = options.context.clone();

   let begin = connection.begin_statement(options);
   connection.query(&begin, context.clone()).await?;

   let outcome = AssertUnwindSafe(async { body(&mut *connection).await })
      .catch_unwind()
      .await;

   match outcome {
      Ok(Ok(value)) => match connection
         .query(&Statement::new("COMMIT"), context.clone())
         .await
      {
         Ok(_) => {
            debug!("Transaction committed");
            Ok(value)
         }

         // SQLite keeps the transaction open when COMMIT fails
         Err(commit) => {
            debug!(error = %commit, "Transaction commit failed");
            match roll_back(connection, &context).await {
               Ok(()) => Err(L::from(commit)),
               Err(rollback) => Err(L::from(Error::TransactionRollback {
                  rollback,
                  original: Box::new(commit),
                  context,
               })),
            }
         }
      },

      Ok(Err(original)) => match roll_back(connection, &context).await {
         Ok(()) => Err(original),
         Err(rollback) => Err(L::from(Error::TransactionRollback {
            rollback,
            original: Box::new(original),
            context,
         })),
      },

      Err(payload) => match roll_back(connection, &context).await {
         Ok(()) => panic::resume_unwind(payload),
         Err(rollback) => Err(L::from(Error::TransactionRollback {
            rollback,
            original: Box::new(Fault::from_panic(payload)),
            context,
         })),
      },
   }
}

/// Issue ROLLBACK; a failure leaves the connection's transaction state unknown.
async fn roll_back<C: DriverConnection>(
   connection: &mut Connection<C>,
   context: &JsonValue,
) -> Result<(), Cause> {
   match connection
      .query(&Statement::new("ROLLBACK"), context.clone())
      .await
   {
      Ok(_) => {
         debug!("Transaction rolled back");
         Ok(())
      }
      Err(rollback) => {
         warn!(error = %rollback, "Transaction rollback failed");
         Err(Box::new(rollback))
      }
   }
}
