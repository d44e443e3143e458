//! Units of database work driven once per checkout

use std::marker::PhantomData;

use futures::future::BoxFuture;

use crate::driver::DriverConnection;
use crate::environment::Environment;

/// Database work to perform once a connection is available.
///
/// A program is a value; nothing happens until the execution engine drives
/// it, exactly once, against a checked-out connection. Implement this for
/// your own types, or wrap a closure with [`program`].
pub trait Program<C: DriverConnection, E>: Send {
   type Output: Send;
   type Error: Send;

   fn run<'c>(self, env: Environment<'c, C, E>) -> BoxFuture<'c, Result<Self::Output, Self::Error>>
   where
      Self: 'c;
}

/// A [`Program`] built from a closure. See [`program`].
pub struct FnProgram<F, C, E, A, L> {
   f: F,
   _marker: PhantomData<fn(C, E) -> (A, L)>,
}

/// Turn a closure into a [`Program`].
///
/// ```no_run
/// use serde_json::Value as JsonValue;
/// use sqlx_conn_guard::{program, sqlite, PoolConfig, Statement};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = sqlite::connect(PoolConfig::new("sqlite://app.db")).await?;
///
/// let rows = pool
///    .with_connection(program(|mut env| {
///       Box::pin(async move {
///          env.query(&Statement::new("SELECT 1 AS one"), JsonValue::Null).await
///       })
///    }))
///    .await?;
/// # Ok(())
/// # }
/// ```
pub fn program<C, E, A, L, F>(f: F) -> FnProgram<F, C, E, A, L>
where
   C: DriverConnection,
   F: for<'c> FnOnce(Environment<'c, C, E>) -> BoxFuture<'c, Result<A, L>> + Send,
{
   FnProgram {
      f,
      _marker: PhantomData,
   }
}

impl<F, C, E, A, L> Program<C, E> for FnProgram<F, C, E, A, L>
where
   C: DriverConnection,
   F: for<'c> FnOnce(Environment<'c, C, E>) -> BoxFuture<'c, Result<A, L>> + Send,
   A: Send,
   L: Send,
{
   type Output = A;
   type Error = L;

   fn run<'c>(self, env: Environment<'c, C, E>) -> BoxFuture<'c, Result<A, L>>
   where
      Self: 'c,
   {
      (self.f)(env)
   }
}
