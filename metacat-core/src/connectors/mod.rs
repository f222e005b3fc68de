//! Live connectors for registered target stores.
//!
//! Two operations reach out of the catalog: a connection probe (handshake
//! only) and column introspection against a target table. Both are bounded
//! by the configured probe timeout and both are advisory: a probe reports
//! its outcome as a value, introspection degrades to `None`; neither ever
//! takes the catalog down with an upstream fault.
//!
//! Engines are feature-gated so deployments can compile out drivers they
//! never talk to.

use std::time::Duration;

use crate::models::{ColumnSpec, ConnectionRecord, ConnectionTestResult, DatabaseType};

#[cfg(feature = "mongodb")]
pub mod mongo;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgresql")]
pub mod postgres;

/// Attempts a live handshake with the target store.
///
/// Always returns a value; failures (including the time bound elapsing) are
/// reported in the result, never as an error.
pub async fn test_connection(
    conn: &ConnectionRecord,
    password: Option<&str>,
    timeout: Duration,
) -> ConnectionTestResult {
    let attempt = async {
        match conn.db_type {
            #[cfg(feature = "postgresql")]
            DatabaseType::PostgreSql => postgres::probe(conn, password).await,
            #[cfg(feature = "mysql")]
            DatabaseType::MySql => mysql::probe(conn, password).await,
            #[cfg(feature = "mongodb")]
            DatabaseType::MongoDb => mongo::probe(conn, password).await,
            #[allow(unreachable_patterns)]
            other => ConnectionTestResult::failed(format!(
                "support for {} is not compiled into this build",
                other
            )),
        }
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => {
            if result.success {
                tracing::info!("Connection test succeeded for '{}'", conn.name);
            } else {
                tracing::warn!(
                    "Connection test failed for '{}': {}",
                    conn.name,
                    result.error.as_deref().unwrap_or("unknown")
                );
            }
            result
        }
        Err(_) => {
            tracing::warn!(
                "Connection test for '{}' timed out after {:?}",
                conn.name,
                timeout
            );
            ConnectionTestResult::failed(format!("timed out after {:?}", timeout))
        }
    }
}

/// Reads live column descriptors for one table on the target store.
///
/// Returns `None` on any upstream fault (unreachable store, unknown table,
/// time bound elapsed) after logging a warning; registration flows fall back
/// to manual column entry.
pub async fn introspect_columns(
    conn: &ConnectionRecord,
    password: Option<&str>,
    database_name: &str,
    table_name: &str,
    timeout: Duration,
) -> Option<Vec<ColumnSpec>> {
    let attempt = async {
        match conn.db_type {
            #[cfg(feature = "postgresql")]
            DatabaseType::PostgreSql => {
                postgres::introspect(conn, password, database_name, table_name).await
            }
            #[cfg(feature = "mysql")]
            DatabaseType::MySql => {
                mysql::introspect(conn, password, database_name, table_name).await
            }
            #[cfg(feature = "mongodb")]
            DatabaseType::MongoDb => {
                mongo::introspect(conn, password, database_name, table_name).await
            }
            #[allow(unreachable_patterns)]
            other => Err(format!("support for {} is not compiled into this build", other)),
        }
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(columns)) => {
            tracing::debug!(
                "Introspected {} columns from {}.{}",
                columns.len(),
                database_name,
                table_name
            );
            Some(columns)
        }
        Ok(Err(reason)) => {
            tracing::warn!(
                "Introspection of {}.{} via '{}' failed: {}",
                database_name,
                table_name,
                conn.name,
                reason
            );
            None
        }
        Err(_) => {
            tracing::warn!(
                "Introspection of {}.{} via '{}' timed out after {:?}",
                database_name,
                table_name,
                conn.name,
                timeout
            );
            None
        }
    }
}
