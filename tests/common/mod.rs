//! In-memory driver that records every checkout, query and release.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use sqlx_conn_guard::{
   Backend, Cause, ConnectionPool, Driver, DriverConnection, Error, FaultSink, PoolConfig, Row,
   Statement, TypeParsers,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared record of what the driver was asked to do.
#[derive(Default)]
pub struct Probe {
   acquired: AtomicUsize,
   shutdowns: AtomicUsize,
   in_use: AtomicUsize,
   max_in_use: AtomicUsize,
   releases: Mutex<Vec<Option<String>>>,
   queries: Mutex<Vec<String>>,
   failing: Mutex<HashSet<String>>,
   faults: Mutex<Option<FaultSink>>,
   parser_types: Mutex<Vec<String>>,
}

impl Probe {
   pub fn acquired(&self) -> usize {
      self.acquired.load(Ordering::SeqCst)
   }

   pub fn shutdowns(&self) -> usize {
      self.shutdowns.load(Ordering::SeqCst)
   }

   pub fn max_in_use(&self) -> usize {
      self.max_in_use.load(Ordering::SeqCst)
   }

   /// One entry per release: `None` for clean, the error code for unhealthy.
   pub fn releases(&self) -> Vec<Option<String>> {
      self.releases.lock().unwrap().clone()
   }

   pub fn queries(&self) -> Vec<String> {
      self.queries.lock().unwrap().clone()
   }

   pub fn parser_types(&self) -> Vec<String> {
      self.parser_types.lock().unwrap().clone()
   }

   /// Make every execution of `query` fail at the driver level.
   pub fn fail_on(&self, query: &str) {
      self.failing.lock().unwrap().insert(query.to_string());
   }

   /// The sink the pool handed to the driver at creation.
   pub fn faults(&self) -> FaultSink {
      self.faults.lock().unwrap().clone().expect("pool not created")
   }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
   pub probe: Arc<Probe>,
   pub refuse_connect: bool,
   pub exhausted: bool,
   pub reject_parsers: bool,
}

impl Backend for FakeBackend {
   type Driver = FakeDriver;

   async fn connect(self, config: &PoolConfig, faults: FaultSink) -> Result<FakeDriver, Cause> {
      if self.refuse_connect {
         return Err("connection refused".into());
      }

      *self.probe.faults.lock().unwrap() = Some(faults);

      Ok(FakeDriver {
         probe: self.probe,
         permits: Arc::new(Semaphore::new(config.max_connections as usize)),
         exhausted: self.exhausted,
         reject_parsers: self.reject_parsers,
      })
   }
}

pub struct FakeDriver {
   probe: Arc<Probe>,
   permits: Arc<Semaphore>,
   exhausted: bool,
   reject_parsers: bool,
}

impl Driver for FakeDriver {
   type Connection = FakeConnection;

   async fn acquire(&self) -> Result<FakeConnection, Cause> {
      if self.exhausted {
         return Err("too many clients already".into());
      }

      let permit = Arc::clone(&self.permits).acquire_owned().await?;

      self.probe.acquired.fetch_add(1, Ordering::SeqCst);
      let in_use = self.probe.in_use.fetch_add(1, Ordering::SeqCst) + 1;
      self.probe.max_in_use.fetch_max(in_use, Ordering::SeqCst);

      Ok(FakeConnection {
         probe: Arc::clone(&self.probe),
         _permit: permit,
      })
   }

   async fn shutdown(&self) -> Result<(), Cause> {
      self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
      self.permits.close();
      Ok(())
   }

   fn install_type_parsers(&self, parsers: TypeParsers) -> Result<(), Cause> {
      if self.reject_parsers {
         return Err("type parsers are not supported".into());
      }
      let mut types: Vec<String> = parsers.into_keys().collect();
      types.sort();
      *self.probe.parser_types.lock().unwrap() = types;
      Ok(())
   }
}

pub struct FakeConnection {
   probe: Arc<Probe>,
   _permit: OwnedSemaphorePermit,
}

impl DriverConnection for FakeConnection {
   async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, Cause> {
      self.probe.queries.lock().unwrap().push(statement.query.clone());
      tokio::task::yield_now().await;

      if self.probe.failing.lock().unwrap().contains(&statement.query) {
         return Err(format!("server closed the connection during '{}'", statement.query).into());
      }

      let mut row = Row::default();
      row.insert("query".to_string(), json!(statement.query));
      row.insert("binds".to_string(), json!(statement.values.len()));
      Ok(vec![row])
   }

   fn release(self, error: Option<&Error>) {
      self.probe.in_use.fetch_sub(1, Ordering::SeqCst);
      self
         .probe
         .releases
         .lock()
         .unwrap()
         .push(error.map(|e| e.error_code().to_string()));
   }
}

pub async fn fake_pool(backend: FakeBackend, config: PoolConfig) -> ConnectionPool<FakeDriver> {
   ConnectionPool::create(backend, config)
      .await
      .expect("fake pool should be created")
}

pub fn init_tracing() {
   let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
