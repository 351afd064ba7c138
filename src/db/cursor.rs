//! Request-scoped cursor and the connection handle behind it.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Column, Connection, Converters, DbError, ResultSet};

// ── ConnectionHandle ──────────────────────────────────────────────────────────

/// Shared ownership of the one connection a request opened.
///
/// The middleware keeps one clone to commit, roll back and close; the cursor
/// handed to the handler keeps the other. Closing takes the connection out,
/// so a second close is a no-op and a late cursor call sees
/// [`DbError::Closed`].
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    inner: Arc<Mutex<Option<Box<dyn Connection>>>>,
}

impl ConnectionHandle {
    pub(crate) fn new(conn: Box<dyn Connection>) -> Self {
        Self { inner: Arc::new(Mutex::new(Some(conn))) }
    }

    pub(crate) async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet, DbError> {
        let mut guard = self.inner.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        conn.execute(sql, params).await
    }

    pub(crate) async fn commit(&self) -> Result<(), DbError> {
        let mut guard = self.inner.lock().await;
        guard.as_mut().ok_or(DbError::Closed)?.commit().await
    }

    pub(crate) async fn rollback(&self) -> Result<(), DbError> {
        let mut guard = self.inner.lock().await;
        guard.as_mut().ok_or(DbError::Closed)?.rollback().await
    }

    pub(crate) async fn close(&self) -> Result<(), DbError> {
        let conn = self.inner.lock().await.take();
        match conn {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

// ── Row ───────────────────────────────────────────────────────────────────────

/// One fetched row.
///
/// The shape follows the route's `result_as_mapping` setting: an ordered
/// column-name → value map, or the bare values in column order. Serializes
/// as a JSON object or array respectively.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    Mapping(IndexMap<String, Value>),
    Sequence(Vec<Value>),
}

impl Row {
    /// Value of the named column. Always `None` for sequence rows.
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self {
            Self::Mapping(map) => map.get(column),
            Self::Sequence(_) => None,
        }
    }

    /// Value at a column position, for either shape.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Mapping(map) => map.get_index(index).map(|(_, v)| v),
            Self::Sequence(values) => values.get(index),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Mapping(map) => map.len(),
            Self::Sequence(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Cursor ────────────────────────────────────────────────────────────────────

/// The database cursor injected into a handler.
///
/// Each [`execute`](Cursor::execute) buffers the complete result; the
/// `fetch_*` methods then drain it. Nothing a handler does through the cursor
/// is durable until the middleware commits after the handler returns (or
/// the handler calls [`commit`](Cursor::commit) itself on a route that runs
/// with autocommit off).
///
/// ```rust,ignore
/// async fn show(mut req: Request) -> Result<Response, Abort> {
///     let mut db: Cursor = req.take_arg("db").ok_or_else(|| Abort::missing_arg("db"))?;
///     db.execute("SELECT * FROM items WHERE name = ?", &[json!(req.param("item"))]).await?;
///     match db.fetch_one() {
///         Some(row) => Ok(Response::json(serde_json::to_vec(&row).unwrap_or_default())),
///         None => Err(HttpError::not_found("Page not found").into()),
///     }
/// }
/// ```
pub struct Cursor {
    conn: ConnectionHandle,
    as_mapping: bool,
    converters: Option<Converters>,
    columns: Vec<Column>,
    rows: VecDeque<Vec<Value>>,
    row_count: u64,
    last_insert_id: Option<u64>,
}

impl Cursor {
    pub(crate) fn new(conn: ConnectionHandle, as_mapping: bool, converters: Option<Converters>) -> Self {
        Self {
            conn,
            as_mapping,
            converters,
            columns: Vec::new(),
            rows: VecDeque::new(),
            row_count: 0,
            last_insert_id: None,
        }
    }

    /// Executes one statement with positional `?` parameters.
    ///
    /// Returns the row count: rows produced for a query, rows affected for
    /// a write. Any unread rows of the previous statement are discarded.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let result = self.conn.execute(sql, params).await?;
        self.load(result);
        Ok(self.row_count)
    }

    /// Executes `sql` once per parameter set. Returns the total rows affected.
    pub async fn execute_many<I, P>(&mut self, sql: &str, batches: I) -> Result<u64, DbError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[Value]>,
    {
        let mut total = 0;
        for params in batches {
            total += self.execute(sql, params.as_ref()).await?;
        }
        self.row_count = total;
        Ok(total)
    }

    pub fn fetch_one(&mut self) -> Option<Row> {
        let values = self.rows.pop_front()?;
        Some(self.shape(values))
    }

    pub fn fetch_many(&mut self, n: usize) -> Vec<Row> {
        let take = n.min(self.rows.len());
        let batch: Vec<_> = self.rows.drain(..take).collect();
        batch.into_iter().map(|values| self.shape(values)).collect()
    }

    pub fn fetch_all(&mut self) -> Vec<Row> {
        let batch: Vec<_> = self.rows.drain(..).collect();
        batch.into_iter().map(|values| self.shape(values)).collect()
    }

    /// Columns of the last statement. Empty for writes.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// `AUTO_INCREMENT` value generated by the last insert, if any.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// Commits the work done so far.
    pub async fn commit(&self) -> Result<(), DbError> {
        self.conn.commit().await
    }

    /// Discards the work done since the last commit.
    pub async fn rollback(&self) -> Result<(), DbError> {
        self.conn.rollback().await
    }

    fn load(&mut self, result: ResultSet) {
        self.row_count = if result.rows.is_empty() {
            result.rows_affected
        } else {
            result.rows.len() as u64
        };
        self.last_insert_id = result.last_insert_id;
        self.columns = result.columns;
        self.rows = result.rows.into();
    }

    fn shape(&self, values: Vec<Value>) -> Row {
        let values = values.into_iter().enumerate().map(|(i, value)| {
            match (&self.converters, self.columns.get(i)) {
                (Some(conv), Some(col)) => conv.apply(&col.type_name, value),
                _ => value,
            }
        });

        if self.as_mapping {
            let map = values
                .enumerate()
                .map(|(i, value)| {
                    let name = self.columns.get(i).map_or_else(|| i.to_string(), |c| c.name.clone());
                    (name, value)
                })
                .collect();
            Row::Mapping(map)
        } else {
            Row::Sequence(values.collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use serde_json::json;

    use super::*;

    /// Returns the same canned result for every statement.
    struct Canned(ResultSet);

    impl Connection for Canned {
        fn execute<'a>(
            &'a mut self,
            _sql: &'a str,
            _params: &'a [Value],
        ) -> BoxFuture<'a, Result<ResultSet, DbError>> {
            let result = self.0.clone();
            Box::pin(async move { Ok(result) })
        }

        fn commit(&mut self) -> BoxFuture<'_, Result<(), DbError>> {
            Box::pin(async { Ok(()) })
        }

        fn rollback(&mut self) -> BoxFuture<'_, Result<(), DbError>> {
            Box::pin(async { Ok(()) })
        }

        fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn items() -> ResultSet {
        ResultSet {
            columns: vec![Column::new("id", "BIGINT"), Column::new("name", "VARCHAR")],
            rows: vec![
                vec![json!(1), json!("apple")],
                vec![json!(2), json!("pear")],
                vec![json!(3), json!("plum")],
            ],
            rows_affected: 0,
            last_insert_id: None,
        }
    }

    fn cursor(as_mapping: bool, converters: Option<Converters>) -> Cursor {
        let handle = ConnectionHandle::new(Box::new(Canned(items())));
        Cursor::new(handle, as_mapping, converters)
    }

    #[tokio::test]
    async fn mapping_rows_keep_column_order() {
        let mut cur = cursor(true, None);
        assert_eq!(cur.execute("SELECT id, name FROM items", &[]).await.unwrap(), 3);

        let row = cur.fetch_one().unwrap();
        assert_eq!(row.get("name"), Some(&json!("apple")));
        assert_eq!(row.at(0), Some(&json!(1)));
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"id":1,"name":"apple"}"#);
    }

    #[tokio::test]
    async fn sequence_rows_are_positional() {
        let mut cur = cursor(false, None);
        cur.execute("SELECT id, name FROM items", &[]).await.unwrap();

        let row = cur.fetch_one().unwrap();
        assert_eq!(row, Row::Sequence(vec![json!(1), json!("apple")]));
        assert_eq!(row.get("name"), None);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"[1,"apple"]"#);
    }

    #[tokio::test]
    async fn fetch_many_then_fetch_all_drains_in_order() {
        let mut cur = cursor(false, None);
        cur.execute("SELECT id, name FROM items", &[]).await.unwrap();

        let first = cur.fetch_many(2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].at(1), Some(&json!("pear")));

        let rest = cur.fetch_all();
        assert_eq!(rest.len(), 1);
        assert!(cur.fetch_one().is_none());
        assert!(cur.fetch_many(5).is_empty());
    }

    #[tokio::test]
    async fn converters_apply_by_column_type() {
        let conv = Converters::new().with("BIGINT", |v| json!(format!("#{v}")));
        let mut cur = cursor(true, Some(conv));
        cur.execute("SELECT id, name FROM items", &[]).await.unwrap();

        let row = cur.fetch_one().unwrap();
        assert_eq!(row.get("id"), Some(&json!("#1")));
        assert_eq!(row.get("name"), Some(&json!("apple")));
    }

    #[tokio::test]
    async fn closed_connection_rejects_statements() {
        let handle = ConnectionHandle::new(Box::new(Canned(items())));
        let mut cur = Cursor::new(handle.clone(), true, None);

        handle.close().await.unwrap();
        handle.close().await.unwrap();

        assert!(matches!(cur.execute("SELECT 1", &[]).await, Err(DbError::Closed)));
        assert!(matches!(cur.commit().await, Err(DbError::Closed)));
    }
}
