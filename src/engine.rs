//! Checkout → run → release

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::config::ReleasePolicy;
use crate::connection::Connection;
use crate::driver::DriverConnection;
use crate::environment::Environment;
use crate::error::{ConnectionError, Fault, ProgramFailure};
use crate::program::Program;

/// Drive `program` once against `connection`, then release the connection.
///
/// Release happens exactly once whatever the program does:
///
/// - success releases clean and yields the value
/// - a failure the policy flags (by default a failed ROLLBACK) releases with
///   that error attached so the driver discards the connection
/// - any other failure releases clean; the failure is returned unchanged
/// - a panic is caught, the connection released clean, and the panic
///   reported as [`ConnectionError::UnhandledConnection`]
pub(crate) async fn execute<C, E, P>(
   mut connection: Connection<C>,
   ext: E,
   program: P,
   policy: ReleasePolicy,
) -> Result<P::Output, ConnectionError<P::Error>>
where
   C: DriverConnection,
   E: Send,
   P: Program<C, E>,
   P::Error: ProgramFailure,
{
   let outcome = {
      let env = Environment::new(&mut connection, ext);
      // `run` itself may panic before handing back a future
      AssertUnwindSafe(async move { program.run(env).await })
         .catch_unwind()
         .await
   };

   match outcome {
      Ok(Ok(value)) => {
         connection.release(None);
         debug!("Program succeeded, connection released");
         Ok(value)
      }
      Ok(Err(failure)) => {
         let unhealthy = failure
            .as_pool_error()
            .filter(|error| policy.discards(error));

         match unhealthy {
            Some(error) => {
               debug!(code = error.error_code(), "Program failed, releasing connection as unhealthy");
            }
            None => debug!("Program failed, connection released"),
         }

         connection.release(unhealthy);
         Err(ConnectionError::Program(failure))
      }
      Err(payload) => {
         let fault = Fault::from_panic(payload);
         warn!(error = %fault, "Program panicked while holding a connection");
         connection.release(None);
         Err(ConnectionError::UnhandledConnection {
            cause: Box::new(fault),
         })
      }
   }
}
