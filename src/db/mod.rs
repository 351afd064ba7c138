//! Database seam.
//!
//! The middleware never talks to a driver directly. It goes through two
//! traits:
//!
//! - [`Connector`] opens one [`Connection`] from a resolved
//!   [`ConnectionConfig`](crate::middleware::mysql::ConnectionConfig).
//! - [`Connection`] executes statements and ends the unit of work with
//!   `commit`, `rollback` and `close`.
//!
//! [`MySqlConnector`] is the production implementation on top of `sqlx`.
//! Tests plug in a counting stub instead.
//!
//! Every statement runs inside an implicit transaction: nothing is durable
//! until [`Connection::commit`] is called. That is what makes the
//! middleware's commit-or-rollback decision meaningful.

mod convert;
mod cursor;
mod error;
mod mysql;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::abort::Abort;
use crate::middleware::mysql::ConnectionConfig;

pub use convert::Converters;
pub use cursor::{Cursor, Row};
pub(crate) use cursor::ConnectionHandle;
pub use error::DbError;
pub use mysql::MySqlConnector;

/// Opens connections. One instance is shared by every request of a route.
pub trait Connector: Send + Sync + 'static {
    /// Opens a new connection described by `config`.
    ///
    /// A driver failure is reported as [`Abort::Failure`] and reaches the
    /// caller unchanged. Any other [`Abort`] is treated as a framework
    /// response raised while connecting and is turned into a
    /// `500 Database Error`.
    fn connect<'a>(
        &'a self,
        config: &'a ConnectionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, Abort>>;
}

/// One open database session, exclusively owned by a single request.
pub trait Connection: Send + 'static {
    /// Runs one statement and buffers its complete result.
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Result<ResultSet, DbError>>;

    fn commit(&mut self) -> BoxFuture<'_, Result<(), DbError>>;

    fn rollback(&mut self) -> BoxFuture<'_, Result<(), DbError>>;

    /// Closes the session. Uncommitted work is discarded by the server.
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>>;
}

/// Name and driver type of one result column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Upper-case SQL type name as reported by the driver, e.g. `BIGINT`.
    pub type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

/// The buffered outcome of one statement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    /// Positional cells, one inner `Vec` per row, in `columns` order.
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}
