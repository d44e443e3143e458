//! Connection pool with guaranteed release and classified errors

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{PoolConfig, ReleasePolicy};
use crate::connection::Connection;
use crate::driver::{Backend, Driver, FaultSink};
use crate::engine;
use crate::error::{Cause, ConnectionError, Error, Fault, ProgramFailure, Result};
use crate::program::Program;

/// Connection pool shared by every concurrent caller of one database.
///
/// ## State Management
///
/// - **`driver`**: The underlying pool; owns the live connections and the checkout queue
/// - **`ending`**: Set once by [`end`](Self::end); never cleared. New work is refused after it is set
///
/// ## Usage Pattern
///
/// ```text
/// 1. Create the pool once per database (ConnectionPool::create)
/// 2. Run programs with with_connection / with_connection_e; each checks out
///    one connection, runs the program once, and releases it
/// 3. End the pool when done (end is idempotent)
/// ```
///
/// Cloning is cheap and every clone refers to the same pool.
pub struct ConnectionPool<D: Driver> {
   inner: Arc<PoolInner<D>>,
}

struct PoolInner<D> {
   driver: D,
   ending: AtomicBool,
   acquire_timeout: Duration,
   release_policy: ReleasePolicy,
}

impl<D: Driver> ConnectionPool<D> {
   /// Create a pool from `backend` and `config`.
   ///
   /// Faults raised later by idle connections are delivered to
   /// `config.on_error` as [`Error::UnhandledPool`]. If `config.type_parsers`
   /// is set they are installed after the driver pool is built; a failure
   /// there shuts the driver down again and is reported as
   /// [`Error::TypeParserSetup`] rather than [`Error::PoolCreation`].
   pub async fn create<B>(backend: B, config: PoolConfig) -> Result<Self>
   where
      B: Backend<Driver = D>,
   {
      let faults = FaultSink::new(config.on_error.clone());

      let driver = backend
         .connect(&config, faults)
         .await
         .map_err(|cause| Error::PoolCreation { cause })?;

      if let Some(parsers) = config.type_parsers.clone() {
         let column_types = parsers.len();
         if let Err(cause) = driver.install_type_parsers(parsers) {
            if let Err(shutdown) = driver.shutdown().await {
               warn!(error = %shutdown, "Failed to shut down pool after type parser setup failure");
            }
            return Err(Error::TypeParserSetup { cause });
         }
         debug!(column_types, "Installed type parsers");
      }

      debug!(
         max_connections = config.max_connections,
         min_connections = config.min_connections,
         "Connection pool created"
      );

      Ok(Self {
         inner: Arc::new(PoolInner {
            driver,
            ending: AtomicBool::new(false),
            acquire_timeout: config.acquire_timeout,
            release_policy: config.release_policy,
         }),
      })
   }

   /// Shut the pool down, waiting for checked-out connections to come back.
   ///
   /// Idempotent: once the pool is ending, later calls return `Ok(())`
   /// without touching the driver again.
   pub async fn end(&self) -> Result<()> {
      if self.inner.ending.swap(true, Ordering::AcqRel) {
         debug!("Pool already ending, skipping shutdown");
         return Ok(());
      }

      debug!("Ending connection pool");

      self
         .inner
         .driver
         .shutdown()
         .await
         .map_err(|cause| Error::PoolShutdown { cause })
   }

   /// Whether [`end`](Self::end) has been called.
   pub fn is_ending(&self) -> bool {
      self.inner.ending.load(Ordering::Acquire)
   }

   /// Check out a connection, run `program` once, and release the connection.
   pub async fn with_connection<P>(
      &self,
      program: P,
   ) -> std::result::Result<P::Output, ConnectionError<P::Error>>
   where
      P: Program<D::Connection, ()>,
      P::Error: ProgramFailure,
   {
      self.with_connection_e((), program).await
   }

   /// Like [`with_connection`](Self::with_connection), additionally handing
   /// the program the caller's extension `ext` through its environment.
   pub async fn with_connection_e<E, P>(
      &self,
      ext: E,
      program: P,
   ) -> std::result::Result<P::Output, ConnectionError<P::Error>>
   where
      E: Send,
      P: Program<D::Connection, E>,
      P::Error: ProgramFailure,
   {
      let connection = self
         .checkout()
         .await
         .map_err(|cause| ConnectionError::PoolCheckout { cause })?;

      engine::execute(connection, ext, program, self.inner.release_policy).await
   }

   /// Check out a connection without running a program.
   ///
   /// The caller owns the returned connection and must
   /// [`release`](Connection::release) it; dropping it releases it as
   /// unhealthy.
   pub async fn acquire(&self) -> Result<Connection<D::Connection>> {
      self
         .checkout()
         .await
         .map_err(|cause| Error::PoolCheckout { cause })
   }

   /// Access the underlying driver.
   pub fn driver(&self) -> &D {
      &self.inner.driver
   }

   async fn checkout(&self) -> std::result::Result<Connection<D::Connection>, Cause> {
      if self.is_ending() {
         return Err(Box::new(Fault::PoolEnding));
      }

      let timeout = self.inner.acquire_timeout;
      match tokio::time::timeout(timeout, self.inner.driver.acquire()).await {
         Ok(Ok(handle)) => Ok(Connection::new(handle)),
         Ok(Err(cause)) => {
            debug!(error = %cause, "Checkout failed");
            Err(cause)
         }
         Err(_) => {
            debug!(?timeout, "Checkout timed out");
            Err(Box::new(Fault::AcquireTimeout(timeout)))
         }
      }
   }
}

impl<D: Driver> Clone for ConnectionPool<D> {
   fn clone(&self) -> Self {
      Self {
         inner: Arc::clone(&self.inner),
      }
   }
}

impl<D: Driver> std::fmt::Debug for ConnectionPool<D> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("ConnectionPool")
         .field("ending", &self.is_ending())
         .field("acquire_timeout", &self.inner.acquire_timeout)
         .field("release_policy", &self.inner.release_policy)
         .finish()
   }
}
