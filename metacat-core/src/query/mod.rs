//! Dynamic table queries: catalog lookup, planning, execution, shaping.
//!
//! The pipeline is lookup -> plan -> count -> data. An unknown table is
//! rejected before any round trip to a target store; the plan is computed
//! purely from registered metadata.

use std::sync::Arc;

use crate::error::{CatalogError, Result};
use crate::models::{QueryParams, TableDataResponse};
use crate::store::MetadataStore;

pub mod executor;
pub mod plan;

pub use executor::{QueryExecutor, SqliteExecutor};
pub use plan::{Dialect, QueryPlan};

/// Serves filter/sort/paginate requests against registered tables.
#[derive(Clone)]
pub struct TableDataService {
    metadata: MetadataStore,
    executor: Arc<dyn QueryExecutor>,
}

impl TableDataService {
    pub fn new(metadata: MetadataStore, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { metadata, executor }
    }

    /// Runs one paginated query against a registered table.
    ///
    /// # Errors
    /// `TableNotRegistered` if the table is unknown to the catalog (decided
    /// before any statement is executed); `QueryExecution` if the target
    /// store rejects a planned statement.
    pub async fn query_table_data(
        &self,
        table_name: &str,
        params: &QueryParams,
    ) -> Result<TableDataResponse> {
        let Some(registered) = self.metadata.get_table_by_name(table_name).await? else {
            return Err(CatalogError::table_not_registered(table_name));
        };

        let plan = QueryPlan::build(
            &registered.table,
            &registered.columns,
            params,
            self.executor.dialect(),
        );
        tracing::debug!("Planned query for {}: {}", table_name, plan.data_sql);

        let total = self.executor.fetch_count(&plan.count_sql, &plan.params).await?;
        let data = if total > 0 && plan.page_size > 0 {
            self.executor.fetch_rows(&plan.data_sql, &plan.params).await?
        } else {
            Vec::new()
        };

        let total_pages = if plan.page_size == 0 {
            0
        } else {
            (total + i64::from(plan.page_size) - 1) / i64::from(plan.page_size)
        };

        Ok(TableDataResponse {
            data,
            total,
            page: plan.page,
            page_size: plan.page_size,
            total_pages,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ConnectionSpec, DatabaseType, SortOrder, TableSpec};
    use crate::store::{connect, migrate, ConnectionStore};
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    async fn service_with_orders() -> TableDataService {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();

        // The target table lives in the same store here, so the registered
        // database name is SQLite's own schema name for it.
        sqlx::query(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT, total REAL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for (id, status, total) in [
            (1, "open", 10.0),
            (2, "shipped", 25.5),
            (3, "shipped", 5.0),
            (4, "open", 99.0),
        ] {
            sqlx::query("INSERT INTO orders (id, status, total) VALUES (?, ?, ?)")
                .bind(id)
                .bind(status)
                .bind(total)
                .execute(&pool)
                .await
                .unwrap();
        }

        let connections = ConnectionStore::new(pool.clone(), None);
        let source = connections
            .create(
                &ConnectionSpec {
                    name: "local".into(),
                    db_type: DatabaseType::PostgreSql,
                    host: "localhost".into(),
                    port: None,
                    database: None,
                    username: None,
                    password: None,
                },
                Uuid::new_v4(),
                None,
            )
            .await
            .unwrap();

        let metadata = MetadataStore::new(pool.clone());
        let table = metadata
            .create_table(
                &TableSpec {
                    name: "orders".into(),
                    database_name: "main".into(),
                    table_name: "orders".into(),
                    display_name: None,
                    description: None,
                    connection_id: source.id,
                },
                Uuid::new_v4(),
                None,
            )
            .await
            .unwrap();
        for (name, ty, pos) in [("id", "integer", 1), ("status", "text", 2), ("total", "real", 3)]
        {
            metadata
                .create_column(
                    table.id,
                    &ColumnSpec {
                        column_name: name.into(),
                        display_name: None,
                        data_type: ty.into(),
                        ordinal_position: pos,
                        is_nullable: Some("YES".into()),
                        column_default: None,
                        description: None,
                    },
                )
                .await
                .unwrap();
        }

        TableDataService::new(metadata, Arc::new(SqliteExecutor::new(pool)))
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected() {
        let service = service_with_orders().await;
        let err = service
            .query_table_data("not_registered", &QueryParams::default())
            .await;
        assert!(matches!(err, Err(CatalogError::TableNotRegistered { .. })));
    }

    #[tokio::test]
    async fn test_full_scan_defaults() {
        let service = service_with_orders().await;
        let response = service
            .query_table_data("orders", &QueryParams::default())
            .await
            .unwrap();
        assert_eq!(response.total, 4);
        assert_eq!(response.data.len(), 4);
        assert_eq!(response.page, 1);
        assert_eq!(response.total_pages, 1);
    }

    #[tokio::test]
    async fn test_filter_and_sort() {
        let service = service_with_orders().await;
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("shipped"));
        let response = service
            .query_table_data(
                "orders",
                &QueryParams {
                    filters: Some(filters),
                    sort_by: Some("total".into()),
                    sort_order: SortOrder::Desc,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.data[0].get("id"), Some(&json!(2)));
        assert_eq!(response.data[1].get("id"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_projection_and_pagination() {
        let service = service_with_orders().await;
        let response = service
            .query_table_data(
                "orders",
                &QueryParams {
                    select_fields: Some(vec!["id".into(), "status".into()]),
                    sort_by: Some("id".into()),
                    page: 2,
                    page_size: 3,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.total, 4);
        assert_eq!(response.total_pages, 2);
        assert_eq!(response.data.len(), 1);
        let row = &response.data[0];
        assert_eq!(row.get("id"), Some(&json!(4)));
        assert!(!row.contains_key("total"));
    }

    #[tokio::test]
    async fn test_row_keys_follow_projection_order() {
        let service = service_with_orders().await;
        let response = service
            .query_table_data(
                "orders",
                &QueryParams {
                    select_fields: Some(vec!["total".into(), "id".into()]),
                    page_size: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let keys: Vec<&str> = response.data[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["total", "id"]);
    }

    #[tokio::test]
    async fn test_empty_result_shapes_cleanly() {
        let service = service_with_orders().await;
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("cancelled"));
        let response = service
            .query_table_data(
                "orders",
                &QueryParams {
                    filters: Some(filters),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.total, 0);
        assert!(response.data.is_empty());
        assert_eq!(response.total_pages, 0);
    }

    #[tokio::test]
    async fn test_page_size_zero_yields_no_rows() {
        let service = service_with_orders().await;
        let response = service
            .query_table_data(
                "orders",
                &QueryParams {
                    page_size: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.total, 4);
        assert!(response.data.is_empty());
        assert_eq!(response.total_pages, 0);
    }
}
