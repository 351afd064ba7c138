//! Call-counting database stub shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tsu_mysql::db::{Column, Connection, Connector, DbError, ResultSet};
use tsu_mysql::{Abort, ConnectionConfig, HttpError, Response, StatusCode};

/// Everything the stub saw, shared between the test and its connections.
#[derive(Default)]
pub struct Calls {
    connects: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    statements: Mutex<Vec<String>>,
    databases: Mutex<Vec<Option<String>>>,
}

impl Calls {
    pub fn connects(&self) -> usize { self.connects.load(Ordering::SeqCst) }
    pub fn commits(&self) -> usize { self.commits.load(Ordering::SeqCst) }
    pub fn rollbacks(&self) -> usize { self.rollbacks.load(Ordering::SeqCst) }
    pub fn closes(&self) -> usize { self.closes.load(Ordering::SeqCst) }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// The database name of every connection opened, in order.
    pub fn databases(&self) -> Vec<Option<String>> {
        self.databases.lock().unwrap().clone()
    }
}

/// How [`StubConnector::connect`] answers.
#[derive(Clone, Copy, Debug)]
pub enum ConnectMode {
    Open,
    /// A driver-level failure, as for an unreachable host.
    Refuse,
    /// An HTTP error instead of a connection.
    RaiseHttp,
    /// A response signal instead of a connection.
    RaiseResponse,
}

/// Operations an open stub connection refuses. Each failing call is still
/// counted.
#[derive(Clone, Copy, Debug, Default)]
pub struct Faults {
    pub commit: bool,
    pub rollback: bool,
    pub time_zone: bool,
}

#[derive(Clone)]
pub struct StubConnector {
    pub calls: Arc<Calls>,
    mode: ConnectMode,
    faults: Faults,
}

impl StubConnector {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            mode: ConnectMode::Open,
            faults: Faults::default(),
        }
    }

    pub fn mode(mut self, mode: ConnectMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn fail_commit(mut self) -> Self {
        self.faults.commit = true;
        self
    }

    pub fn fail_rollback(mut self) -> Self {
        self.faults.rollback = true;
        self
    }

    pub fn fail_time_zone(mut self) -> Self {
        self.faults.time_zone = true;
        self
    }
}

impl Connector for StubConnector {
    fn connect<'a>(
        &'a self,
        config: &'a ConnectionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, Abort>> {
        Box::pin(async move {
            self.calls.connects.fetch_add(1, Ordering::SeqCst);
            self.calls.databases.lock().unwrap().push(config.database.clone());

            match self.mode {
                ConnectMode::Open => Ok(Box::new(StubConnection {
                    calls: Arc::clone(&self.calls),
                    faults: self.faults,
                }) as Box<dyn Connection>),
                ConnectMode::Refuse => Err(Abort::from(DbError::connect(
                    config.target().to_string(),
                    "connection refused",
                ))),
                ConnectMode::RaiseHttp => Err(Abort::from(HttpError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "maintenance",
                ))),
                ConnectMode::RaiseResponse => Err(Abort::with(Response::redirect("/elsewhere"))),
            }
        })
    }
}

/// Answers every query with two `items` rows. Statements mentioning
/// `duplicate` fail with a unique-key violation.
pub struct StubConnection {
    calls: Arc<Calls>,
    faults: Faults,
}

impl Connection for StubConnection {
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        _params: &'a [Value],
    ) -> BoxFuture<'a, Result<ResultSet, DbError>> {
        Box::pin(async move {
            self.calls.statements.lock().unwrap().push(sql.to_owned());

            if self.faults.time_zone && sql.starts_with("SET time_zone") {
                return Err(DbError::query(
                    Some("HY000".into()),
                    "Unknown or incorrect time zone",
                ));
            }
            if sql.contains("duplicate") {
                return Err(DbError::integrity(
                    Some("23000".into()),
                    "Duplicate entry 'apple' for key 'items.name'",
                ));
            }
            if sql.starts_with("SELECT") {
                return Ok(items());
            }
            Ok(ResultSet { rows_affected: 1, last_insert_id: Some(3), ..ResultSet::default() })
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<(), DbError>> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        let fail = self.faults.commit;
        Box::pin(async move {
            if fail {
                return Err(DbError::Driver("commit lost".into()));
            }
            Ok(())
        })
    }

    fn rollback(&mut self) -> BoxFuture<'_, Result<(), DbError>> {
        self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
        let fail = self.faults.rollback;
        Box::pin(async move {
            if fail {
                return Err(DbError::Driver("rollback lost".into()));
            }
            Ok(())
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

pub fn items() -> ResultSet {
    ResultSet {
        columns: vec![Column::new("id", "BIGINT"), Column::new("name", "VARCHAR")],
        rows: vec![vec![json!(1), json!("apple")], vec![json!(2), json!("pear")]],
        rows_affected: 0,
        last_insert_id: None,
    }
}
