//! Database handle abstraction.
//!
//! One `Database` trait with two concrete implementations over the
//! same MySQL wire protocol. `BufferedDriver` mirrors a buffered
//! text-protocol client: statements go out as interpolated text with
//! backslash escaping. `PreparedDriver` mirrors a prepared-statement
//! client: statements are prepared and values bound server-side.
//!
//! Handles live for one HTTP request. Each connect call builds a
//! single-connection pool that is dropped at request end; nothing is
//! cached across requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::{ColumnDescriptor, ConnectionSettings, DriverKind};
use common::utils::quote_ident;
use serde_json::{json, Value};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row, TypeInfo};

/// A row as an ordered-by-name column→value mapping.
pub type JsonRow = serde_json::Map<String, Value>;

/// A live handle, shared for the duration of one request.
pub type ResolvedHandle = Arc<dyn Database>;

/// Common surface of the two handle kinds.
#[async_trait]
pub trait Database: Send + Sync {
    /// Which handle kind this is.
    fn kind(&self) -> DriverKind;

    /// Human-readable connection target, for the status banner.
    fn server_info(&self) -> String;

    /// The handle's string-escaping rule (values only; identifiers
    /// go through `quote_ident`).
    fn escape(&self, raw: &str) -> String;

    /// Runs a statement with no parameters and returns its rows.
    async fn query(&self, sql: &str) -> AppResult<Vec<JsonRow>>;

    /// Runs a parameterized statement expecting rows. `?` marks each
    /// parameter position; `None` binds SQL NULL.
    async fn query_params(&self, sql: &str, params: Vec<Option<String>>)
        -> AppResult<Vec<JsonRow>>;

    /// Runs a parameterized mutation and returns affected rows.
    async fn execute(&self, sql: &str, params: Vec<Option<String>>) -> AppResult<u64>;

    /// Runs a statement over the text protocol, discarding output.
    /// Needed for statements the server refuses to prepare (USE).
    async fn exec_raw(&self, sql: &str) -> AppResult<()>;

    /// Table names in the active database.
    async fn list_tables(&self) -> AppResult<Vec<String>>;

    /// Ordered column metadata for a table.
    async fn describe_columns(&self, table: &str) -> AppResult<Vec<ColumnDescriptor>>;
}

/// Opens a handle of the configured kind against host:port.
pub async fn connect(
    settings: &ConnectionSettings,
    timeout: Duration,
) -> AppResult<ResolvedHandle> {
    let url = build_url(settings, false);
    let target = format!("{}:{}", settings.host, settings.port);
    open(settings.driver, &url, &target, timeout).await
}

/// Opens a handle honoring a configured unix socket path, which takes
/// precedence over host:port.
pub async fn connect_manual(
    settings: &ConnectionSettings,
    timeout: Duration,
) -> AppResult<ResolvedHandle> {
    let use_socket = settings.socket.as_deref().is_some_and(|s| !s.is_empty());
    let url = build_url(settings, use_socket);
    let target = if use_socket {
        format!("socket {}", settings.socket.as_deref().unwrap_or_default())
    } else {
        format!("{}:{}", settings.host, settings.port)
    };
    open(settings.driver, &url, &target, timeout).await
}

async fn open(
    kind: DriverKind,
    url: &str,
    target: &str,
    timeout: Duration,
) -> AppResult<ResolvedHandle> {
    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(timeout)
        .connect(url)
        .await
        .map_err(|e| AppError::ConnectionResolution(format!("connection to {target} failed: {e}")))?;

    let info = format!("{target} ({kind})");
    Ok(match kind {
        DriverKind::Buffered => Arc::new(BufferedDriver { pool, info }),
        DriverKind::Prepared => Arc::new(PreparedDriver { pool, info }),
    })
}

fn build_url(settings: &ConnectionSettings, use_socket: bool) -> String {
    let mut url = format!(
        "mysql://{}:{}@{}:{}/{}",
        settings.username, settings.password, settings.host, settings.port, settings.database
    );
    if use_socket {
        if let Some(socket) = settings.socket.as_deref() {
            url = format!(
                "mysql://{}:{}@localhost/{}?socket={}",
                settings.username, settings.password, settings.database, socket
            );
        }
    }
    url
}

/// Buffered text-protocol handle.
pub struct BufferedDriver {
    pool: MySqlPool,
    info: String,
}

/// Prepared-statement handle.
pub struct PreparedDriver {
    pool: MySqlPool,
    info: String,
}

#[async_trait]
impl Database for BufferedDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Buffered
    }

    fn server_info(&self) -> String {
        self.info.clone()
    }

    fn escape(&self, raw: &str) -> String {
        escape_backslash(raw)
    }

    async fn query(&self, sql: &str) -> AppResult<Vec<JsonRow>> {
        let rows = sqlx::raw_sql(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::StatementExecution(e.to_string()))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_params(
        &self,
        sql: &str,
        params: Vec<Option<String>>,
    ) -> AppResult<Vec<JsonRow>> {
        let interpolated = interpolate(sql, &params, escape_backslash);
        self.query(&interpolated).await
    }

    async fn execute(&self, sql: &str, params: Vec<Option<String>>) -> AppResult<u64> {
        let interpolated = interpolate(sql, &params, escape_backslash);
        let result = sqlx::raw_sql(&interpolated)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StatementExecution(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn exec_raw(&self, sql: &str) -> AppResult<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StatementExecution(e.to_string()))?;
        Ok(())
    }

    async fn list_tables(&self) -> AppResult<Vec<String>> {
        list_tables(&self.pool).await
    }

    async fn describe_columns(&self, table: &str) -> AppResult<Vec<ColumnDescriptor>> {
        describe_columns(&self.pool, table).await
    }
}

#[async_trait]
impl Database for PreparedDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Prepared
    }

    fn server_info(&self) -> String {
        self.info.clone()
    }

    fn escape(&self, raw: &str) -> String {
        escape_quote_doubling(raw)
    }

    async fn query(&self, sql: &str) -> AppResult<Vec<JsonRow>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::StatementExecution(e.to_string()))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_params(
        &self,
        sql: &str,
        params: Vec<Option<String>>,
    ) -> AppResult<Vec<JsonRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::StatementExecution(e.to_string()))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, sql: &str, params: Vec<Option<String>>) -> AppResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StatementExecution(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn exec_raw(&self, sql: &str) -> AppResult<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StatementExecution(e.to_string()))?;
        Ok(())
    }

    async fn list_tables(&self) -> AppResult<Vec<String>> {
        list_tables(&self.pool).await
    }

    async fn describe_columns(&self, table: &str) -> AppResult<Vec<ColumnDescriptor>> {
        describe_columns(&self.pool, table).await
    }
}

async fn list_tables(pool: &MySqlPool) -> AppResult<Vec<String>> {
    let rows = sqlx::raw_sql("SHOW TABLES")
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::SchemaIntrospection(e.to_string()))?;
    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get(0)
            .map_err(|e| AppError::SchemaIntrospection(e.to_string()))?;
        tables.push(name);
    }
    Ok(tables)
}

async fn describe_columns(pool: &MySqlPool, table: &str) -> AppResult<Vec<ColumnDescriptor>> {
    let sql = format!("SHOW COLUMNS FROM {}", quote_ident(table));
    let rows = sqlx::raw_sql(&sql)
        .fetch_all(pool)
        .await
        .map_err(|_| AppError::NotFound(format!("table {table}")))?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        columns.push(ColumnDescriptor {
            name: row.try_get("Field").unwrap_or_default(),
            data_type: row.try_get("Type").unwrap_or_default(),
            nullable: row
                .try_get::<String, _>("Null")
                .map(|v| v.eq_ignore_ascii_case("YES"))
                .unwrap_or(false),
            key: row.try_get("Key").unwrap_or_default(),
            default: row.try_get::<Option<String>, _>("Default").unwrap_or(None),
            extra: row.try_get("Extra").unwrap_or_default(),
        });
    }
    Ok(columns)
}

/// Replaces each `?` placeholder with an escaped literal or NULL.
/// A `?` inside a backtick-quoted identifier or a quoted string is
/// not a placeholder (quoted identifiers may legally contain one).
fn interpolate(sql: &str, params: &[Option<String>], escape: fn(&str) -> String) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut values = params.iter();
    let mut quote: Option<char> = None;
    for ch in sql.chars() {
        match quote {
            Some(open) => {
                if ch == open {
                    quote = None;
                }
                out.push(ch);
            }
            None => match ch {
                '`' | '\'' | '"' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => match values.next() {
                    Some(Some(value)) => {
                        out.push('\'');
                        out.push_str(&escape(value));
                        out.push('\'');
                    }
                    Some(None) => out.push_str("NULL"),
                    None => out.push(ch),
                },
                _ => out.push(ch),
            },
        }
    }
    out
}

/// Backslash escaping, the buffered client's rule.
fn escape_backslash(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(ch),
        }
    }
    out
}

/// Quote doubling, the prepared client's rule. Backslashes are still
/// doubled so literals survive servers without NO_BACKSLASH_ESCAPES.
fn escape_quote_doubling(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "''")
}

/// Decodes a row into an ordered-by-name column→value mapping.
fn row_to_json(row: &MySqlRow) -> JsonRow {
    let mut map = serde_json::Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(
            column.name().to_string(),
            decode_value(row, idx, column.type_info().name()),
        );
    }
    map
}

/// Best-effort cell decode keyed on the column's declared type.
/// Undecodable cells become NULL rather than failing the page.
fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "BOOLEAN" | "TINYINT(1)" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "BIT" => row
            .try_get::<Option<u64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        "VARBINARY" | "BINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB"
        | "GEOMETRY" => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|bytes| Value::String(to_hex_literal(&bytes)))
            .unwrap_or(Value::Null),
        // CHAR/VARCHAR/TEXT/ENUM/SET/DECIMAL/JSON and anything else
        // the text protocol reports as a string.
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn to_hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
