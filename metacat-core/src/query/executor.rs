//! Query execution seam.
//!
//! The planner produces SQL plus bound values; executors run them against a
//! concrete engine and hand back engine-neutral JSON rows. The trait exists
//! so the data path can be exercised in tests without a live target store.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo};

use crate::error::{CatalogError, Result};

use super::plan::Dialect;

/// Runs planned statements against one target store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Placeholder syntax the planner must render for this executor.
    fn dialect(&self) -> Dialect;

    /// Runs a `SELECT COUNT(*)` statement.
    async fn fetch_count(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Runs a data statement and decodes every row into a JSON object.
    async fn fetch_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Map<String, Value>>>;
}

/// Executor over a sqlx SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        // Arrays and objects are bound as their JSON text
        other => query.bind(other.to_string()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Map<String, Value>> {
    // Keys land in statement column order; serde_json's preserve_order
    // feature keeps that order through serialization.
    let mut object = Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INTEGER" => row
                .try_get::<Option<i64>, _>(index)
                .map(|v| v.map_or(Value::Null, Value::from)),
            "REAL" => row
                .try_get::<Option<f64>, _>(index)
                .map(|v| v.map_or(Value::Null, Value::from)),
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(index)
                .map(|v| v.map_or(Value::Null, Value::from)),
            "NULL" => Ok(Value::Null),
            _ => row
                .try_get::<Option<String>, _>(index)
                .map(|v| v.map_or(Value::Null, Value::from)),
        }
        .map_err(|e| CatalogError::query_failed("Failed to decode result row", e))?;
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn fetch_count(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }
        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CatalogError::query_failed("Count query failed", e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| CatalogError::query_failed("Failed to decode count", e))
    }

    async fn fetch_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Map<String, Value>>> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::query_failed("Data query failed", e))?;
        rows.iter().map(decode_row).collect()
    }
}
