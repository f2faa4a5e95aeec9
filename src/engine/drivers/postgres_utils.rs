// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for the PostgreSQL backend: connection options, error
//! mapping, and row decoding.

use std::str::FromStr;
use std::time::Duration;

use gate_core::{ColumnInfo, ConnectionKind, EngineError, RiskTier, Row as GateRow, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow, Postgres};
use sqlx::{Column, Row, TypeInfo};

use crate::config::ConnectionDescriptor;

/// Connect options for a descriptor.
///
/// Direct sessions get the statement timeout as a startup option. Poolers
/// reject unknown startup parameters and may hand each transaction to a
/// different server session, so pooled sessions get no startup options and
/// no statement cache; the timeout is set per transaction instead.
pub fn connect_options(descriptor: &ConnectionDescriptor) -> Result<PgConnectOptions, EngineError> {
    let mut options = PgConnectOptions::from_str(descriptor.url.expose())
        .map_err(|e| EngineError::config(format!("Invalid database URL: {e}")))?
        .application_name(&descriptor.application_name);

    match descriptor.kind {
        ConnectionKind::Direct => {
            if let Some(timeout) = descriptor.statement_timeout() {
                options = options.options([("statement_timeout", format!("{}ms", timeout.as_millis()))]);
            }
        }
        ConnectionKind::PooledTransaction => {
            options = options.statement_cache_capacity(0);
        }
    }
    Ok(options)
}

pub fn pool_options(descriptor: &ConnectionDescriptor) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(descriptor.max_connections)
        .min_connections(descriptor.min_connections)
        .acquire_timeout(descriptor.acquire_timeout())
}

/// `SET LOCAL` statement for a per-transaction statement timeout.
pub fn local_statement_timeout(timeout: Duration) -> String {
    format!("SET LOCAL statement_timeout = '{}ms'", timeout.as_millis())
}

/// Maps a checkout failure.
pub fn map_acquire_error(err: sqlx::Error, acquire_timeout: Duration) -> EngineError {
    match err {
        sqlx::Error::PoolTimedOut => EngineError::PoolExhausted {
            timeout_ms: acquire_timeout.as_millis() as u64,
        },
        other => EngineError::connection_failed(other.to_string()),
    }
}

/// Maps a failure while running statement `index` (or transaction control
/// when `index` is `None`).
pub fn map_statement_error(err: sqlx::Error, index: Option<usize>, tier: RiskTier) -> EngineError {
    match err {
        sqlx::Error::Database(db_err) => EngineError::BackendExecution {
            statement_index: index,
            message: db_err.message().to_string(),
            code: db_err.code().map(|c| c.to_string()),
            tier,
        },
        sqlx::Error::PoolTimedOut => EngineError::PoolExhausted { timeout_ms: 0 },
        other => EngineError::backend(index, tier, other.to_string()),
    }
}

/// Helper to bind a Value to a Postgres query
pub fn bind_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Int(i) => query.bind(i),
        Value::Float(f) => query.bind(f),
        Value::Text(s) => query.bind(s),
        Value::Bytes(b) => query.bind(b),
        Value::Json(j) => query.bind(j),
        Value::Array(items) => {
            if let Some(texts) = items.iter().map(|v| v.as_str().map(str::to_string)).collect::<Option<Vec<_>>>() {
                query.bind(texts)
            } else if let Some(ints) = items
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
            {
                query.bind(ints)
            } else {
                query.bind(Value::Array(items.clone()).to_json())
            }
        }
    }
}

/// Converts a SQLx row to our universal Row type
pub fn convert_row(pg_row: &PgRow) -> GateRow {
    let values = pg_row
        .columns()
        .iter()
        .map(|col| extract_value(pg_row, col.ordinal()))
        .collect();
    GateRow { values }
}

/// Extracts a value from a PgRow at the given index
///
/// Rows from the simple query protocol arrive in text format, so anything
/// not matched by a typed decode is returned as its text representation.
pub fn extract_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<String>>, _>(idx) {
        return v
            .map(|items| Value::Array(items.into_iter().map(Value::Text).collect()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(Value::Json).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(|d| Value::Text(d.format("%Y-%m-%d").to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    Value::Null
}

/// Gets column info from a PgRow
pub fn column_info(row: &PgRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            data_type: col.type_info().name().to_string(),
        })
        .collect()
}
