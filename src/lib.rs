//! # sqlx-conn-guard
//!
//! A resource-safety layer over SQLx connection pools: every checked-out
//! connection is released exactly once, and every failure is reported as one
//! variant of a closed error taxonomy.
//!
//! ## Core Types
//!
//! - **[`ConnectionPool`]**: Owns the driver pool; runs programs with a checked-out connection
//! - **[`Program`]**: A unit of database work, driven once per checkout (see [`program`])
//! - **[`Environment`]**: What a program sees: its [`Connection`] plus caller dependencies
//! - **[`Error`]** / **[`ConnectionError`]**: The error taxonomy
//! - **[`PoolConfig`]**: Pool sizing, timeouts, the background fault callback, type parsers
//!
//! ## Release Rules
//!
//! - Success, or an ordinary failure: the connection goes back to the pool
//! - A failed ROLLBACK ([`Error::TransactionRollback`]): the connection is discarded
//! - A panic inside the program: caught, the connection goes back, and the
//!   caller gets [`ConnectionError::UnhandledConnection`]
//!
//! ## Usage
//!
//! ```no_run
//! use serde_json::json;
//! use sqlx_conn_guard::{program, sqlite, transaction, PoolConfig, Statement, TransactionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!    let config = PoolConfig::new("sqlite://example.db")
//!       .with_on_error(|err| eprintln!("background fault: {err}"));
//!    let pool = sqlite::connect(config).await?;
//!
//!    pool
//!       .with_connection(program(|mut env| {
//!          Box::pin(async move {
//!             let options = TransactionOptions::default();
//!             transaction(env.connection(), &options, |conn| {
//!                Box::pin(async move {
//!                   let insert = Statement::new("INSERT INTO users (name) VALUES ($1)").bind("Alice");
//!                   conn.query(&insert, json!({ "op": "add_user" })).await
//!                })
//!             })
//!             .await
//!          })
//!       }))
//!       .await?;
//!
//!    // Ending twice is fine
//!    pool.end().await?;
//!    pool.end().await?;
//!    Ok(())
//! }
//! ```

mod config;
mod connection;
mod decode;
mod driver;
mod engine;
mod environment;
mod error;
mod pool;
mod program;
pub mod sqlite;
mod transaction;
pub mod validate;

// Re-export public types
pub use config::{ErrorCallback, PoolConfig, ReleasePolicy, TypeParser, TypeParsers};
pub use connection::{Connection, Row, Statement};
pub use driver::{Backend, Driver, DriverConnection, FaultSink};
pub use environment::Environment;
pub use error::{Cause, ConnectionError, Error, Fault, ProgramFailure, Result};
pub use pool::ConnectionPool;
pub use program::{FnProgram, Program, program};
pub use transaction::{IsolationLevel, TransactionOptions, transaction};
