//! MySQL connector on top of `sqlx`.

use futures::TryStreamExt;
use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column as _, ConnectOptions, Connection as _, Either, Executor, MySql, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::{Column, Connection, Connector, DbError, ResultSet};
use crate::abort::Abort;
use crate::middleware::mysql::{ConnectionConfig, Target};

/// Opens one `sqlx` MySQL connection per call.
///
/// The session is switched to `autocommit = 0` right after the handshake so
/// that every statement waits for an explicit commit, and the driver's own
/// `time_zone` override is disabled: the middleware sets the zone itself
/// when the route asks for one.
#[derive(Clone, Copy, Debug, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for MySqlConnector {
    fn connect<'a>(
        &'a self,
        config: &'a ConnectionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, Abort>> {
        Box::pin(async move {
            let target = config.target();
            debug!(%target, database = ?config.database, "opening mysql connection");

            let mut conn = connect_options(config)
                .connect()
                .await
                .map_err(|e| DbError::connect(target.to_string(), e))?;

            conn.execute("SET autocommit = 0").await.map_err(DbError::from)?;

            Ok::<_, Abort>(Box::new(MySqlSession { conn }) as Box<dyn Connection>)
        })
    }
}

fn connect_options(config: &ConnectionConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .charset(&config.charset)
        .timezone(None::<String>);

    options = match config.target() {
        Target::Socket(path) => options.socket(path),
        Target::Tcp { host, port } => options.host(host).port(port),
    };
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password.expose_secret());
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    options
}

struct MySqlSession {
    conn: MySqlConnection,
}

impl Connection for MySqlSession {
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Result<ResultSet, DbError>> {
        Box::pin(async move {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_param(query, param);
            }

            let mut result = ResultSet::default();
            let mut stream = (&mut self.conn).fetch_many(query);
            while let Some(step) = stream.try_next().await? {
                match step {
                    Either::Left(done) => {
                        result.rows_affected += done.rows_affected();
                        let id = done.last_insert_id();
                        if id != 0 {
                            result.last_insert_id = Some(id);
                        }
                    }
                    Either::Right(row) => {
                        if result.columns.is_empty() {
                            result.columns = describe(&row);
                        }
                        result.rows.push(decode_row(&row));
                    }
                }
            }
            Ok::<_, DbError>(result)
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async move {
            self.conn.execute("COMMIT").await?;
            Ok::<_, DbError>(())
        })
    }

    fn rollback(&mut self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async move {
            self.conn.execute("ROLLBACK").await?;
            Ok::<_, DbError>(())
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>> {
        let session = *self;
        Box::pin(async move {
            session.conn.close().await?;
            Ok::<_, DbError>(())
        })
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

fn bind_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q Value,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                query.bind(v)
            } else if let Some(v) = n.as_u64() {
                query.bind(v)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(v) => query.bind(v.as_str()),
        other => query.bind(sqlx::types::Json(other)),
    }
}

// ── Row decoding ──────────────────────────────────────────────────────────────

fn describe(row: &MySqlRow) -> Vec<Column> {
    row.columns()
        .iter()
        .map(|col| Column::new(col.name(), col.type_info().name()))
        .collect()
}

fn decode_row(row: &MySqlRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_cell(row, idx, col.type_info().name()))
        .collect()
}

fn decode_cell(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
        return Value::Null;
    }

    let upper = type_name.to_ascii_uppercase();
    let decoded = if upper == "BOOLEAN" {
        row.try_get::<bool, _>(idx).ok().map(Value::Bool)
    } else if upper.contains("INT") || upper == "YEAR" {
        row.try_get::<i64, _>(idx)
            .map(Value::from)
            .or_else(|_| row.try_get::<u64, _>(idx).map(Value::from))
            .ok()
    } else if upper == "DOUBLE" || upper == "FLOAT" {
        row.try_get::<f64, _>(idx)
            .or_else(|_| row.try_get::<f32, _>(idx).map(f64::from))
            .ok()
            .map(float_value)
    } else if upper == "DECIMAL" {
        row.try_get_unchecked::<String, _>(idx).ok().map(Value::String)
    } else if upper == "JSON" {
        row.try_get::<Value, _>(idx).ok()
    } else if upper == "DATETIME" || upper == "TIMESTAMP" {
        // TIMESTAMP arrives already shifted into the session time zone.
        row.try_get::<chrono::NaiveDateTime, _>(idx).ok().map(datetime_value)
    } else if upper == "DATE" {
        row.try_get::<chrono::NaiveDate, _>(idx).ok().map(|v| Value::String(v.to_string()))
    } else if upper == "TIME" {
        row.try_get::<chrono::NaiveTime, _>(idx).ok().map(|v| Value::String(v.to_string()))
    } else if upper.contains("BLOB") || upper.contains("BINARY") {
        row.try_get::<Vec<u8>, _>(idx).ok().map(bytes_value)
    } else {
        None
    };

    decoded
        .or_else(|| row.try_get_unchecked::<String, _>(idx).ok().map(Value::String))
        .or_else(|| row.try_get_unchecked::<Vec<u8>, _>(idx).ok().map(bytes_value))
        .unwrap_or_else(|| {
            tracing::warn!(column = idx, type_name, "undecodable column value, returning null");
            Value::Null
        })
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

/// Wall-clock text without an offset, in the session time zone.
fn datetime_value(v: chrono::NaiveDateTime) -> Value {
    Value::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
}

/// UTF-8 payloads come back as strings; anything else as an array of bytes.
fn bytes_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::String(text),
        Err(e) => Value::Array(e.into_bytes().into_iter().map(Value::from).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_payloads_keep_their_bytes() {
        assert_eq!(bytes_value(b"abc".to_vec()), Value::String("abc".into()));
        assert_eq!(
            bytes_value(vec![0xff, 0x00]),
            Value::Array(vec![Value::from(255), Value::from(0)])
        );
    }

    #[test]
    fn datetimes_are_written_without_an_offset() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_micro_opt(14, 5, 9, 250_000))
            .unwrap();
        assert_eq!(datetime_value(at), Value::String("2024-03-01 14:05:09.250".into()));

        let whole = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        assert_eq!(datetime_value(whole), Value::String("2024-03-01 00:00:00".into()));
    }

    #[test]
    fn non_finite_floats_fall_back_to_strings() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), Value::String("NaN".into()));
    }
}
