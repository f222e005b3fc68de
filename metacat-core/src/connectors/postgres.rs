//! PostgreSQL connector.

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Row};

use crate::models::{ColumnSpec, ConnectionRecord, ConnectionTestResult};

const COLUMNS_SQL: &str = "SELECT column_name AS name,
        data_type AS data_type,
        ordinal_position::int4 AS pos,
        is_nullable AS nullable,
        column_default AS dflt
     FROM information_schema.columns
     WHERE table_schema = 'public' AND table_name = $1
     ORDER BY ordinal_position";

fn options(
    conn: &ConnectionRecord,
    password: Option<&str>,
    database: Option<&str>,
) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&conn.host)
        .port(conn.port.unwrap_or_else(|| conn.db_type.default_port()));
    if let Some(username) = &conn.username {
        options = options.username(username);
    }
    if let Some(password) = password {
        options = options.password(password);
    }
    if let Some(database) = database.or(conn.database.as_deref()) {
        options = options.database(database);
    }
    options
}

/// Handshake-only probe; connects, pings and disconnects.
pub async fn probe(conn: &ConnectionRecord, password: Option<&str>) -> ConnectionTestResult {
    let options = options(conn, password, None);
    match PgConnection::connect_with(&options).await {
        Ok(mut live) => {
            let pinged = live.ping().await;
            let _ = live.close().await;
            match pinged {
                Ok(()) => ConnectionTestResult::ok(),
                Err(e) => ConnectionTestResult::failed(e.to_string()),
            }
        }
        Err(e) => ConnectionTestResult::failed(e.to_string()),
    }
}

/// Reads column descriptors for one table from `information_schema`.
pub async fn introspect(
    conn: &ConnectionRecord,
    password: Option<&str>,
    database_name: &str,
    table_name: &str,
) -> Result<Vec<ColumnSpec>, String> {
    let options = options(conn, password, Some(database_name));
    let mut live = PgConnection::connect_with(&options)
        .await
        .map_err(|e| e.to_string())?;

    let rows = sqlx::query(COLUMNS_SQL)
        .bind(table_name)
        .fetch_all(&mut live)
        .await;
    let _ = live.close().await;
    let rows = rows.map_err(|e| e.to_string())?;

    if rows.is_empty() {
        return Err(format!("table '{}' not found or has no columns", table_name));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row.try_get("name").map_err(|e| e.to_string())?;
        let data_type: String = row.try_get("data_type").map_err(|e| e.to_string())?;
        let pos: i32 = row.try_get("pos").map_err(|e| e.to_string())?;
        let nullable: String = row.try_get("nullable").map_err(|e| e.to_string())?;
        let dflt: Option<String> = row.try_get("dflt").map_err(|e| e.to_string())?;
        columns.push(ColumnSpec {
            column_name: name,
            display_name: None,
            data_type,
            ordinal_position: pos,
            is_nullable: Some(nullable),
            column_default: dflt,
            description: None,
        });
    }
    Ok(columns)
}
