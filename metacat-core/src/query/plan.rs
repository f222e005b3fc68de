//! Pure query planning against a registered table.
//!
//! A plan is computed entirely from catalog metadata and the caller's
//! parameters; nothing here touches a live store. The registered column set
//! is the sole authority for identifiers: unknown filter keys, projection
//! fields and sort columns are dropped, never interpolated. Values only ever
//! enter the SQL as bound parameters.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::models::{ColumnRecord, QueryParams, ResourceState, TableRecord};

/// Placeholder syntax of the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", position),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }
}

/// A fully rendered count + data statement pair with shared bind values.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub count_sql: String,
    pub data_sql: String,
    pub params: Vec<Value>,
    pub page: u32,
    pub page_size: u32,
}

impl QueryPlan {
    /// Builds a plan for `params` against one registered table.
    ///
    /// Columns marked deleted do not authorize anything. Projection keeps
    /// the caller's field order; an absent or all-unknown projection falls
    /// back to the full registered column list in ordinal order, so the
    /// statement never selects a physical column the catalog does not know.
    pub fn build(
        table: &TableRecord,
        columns: &[ColumnRecord],
        params: &QueryParams,
        dialect: Dialect,
    ) -> Self {
        let mut visible: Vec<&ColumnRecord> = columns
            .iter()
            .filter(|c| c.state != ResourceState::Deleted)
            .collect();
        visible.sort_by_key(|c| c.ordinal_position);
        let ordered: Vec<&str> = visible.iter().map(|c| c.column_name.as_str()).collect();
        let authorized: BTreeSet<&str> = ordered.iter().copied().collect();

        let source = format!("{}.{}", table.database_name, table.table_name);

        let mut predicates: Vec<String> = Vec::new();
        let mut bound: Vec<Value> = Vec::new();
        if let Some(filters) = &params.filters {
            for (key, value) in filters {
                if !authorized.contains(key.as_str()) {
                    tracing::debug!(
                        "Dropping unauthorized filter '{}' on {}",
                        key,
                        table.table_name
                    );
                    continue;
                }
                predicates.push(format!(
                    "{} = {}",
                    key,
                    dialect.placeholder(bound.len() + 1)
                ));
                bound.push(value.clone());
            }
        }
        let where_clause = if predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", predicates.join(" AND "))
        };

        let projection = match &params.select_fields {
            Some(fields) => {
                let kept: Vec<&str> = fields
                    .iter()
                    .map(String::as_str)
                    .filter(|f| authorized.contains(f))
                    .collect();
                if kept.is_empty() {
                    ordered.join(", ")
                } else {
                    kept.join(", ")
                }
            }
            None => ordered.join(", "),
        };

        let order_clause = match &params.sort_by {
            Some(column) if authorized.contains(column.as_str()) => {
                format!(" ORDER BY {} {}", column, params.sort_order.as_sql())
            }
            Some(column) => {
                tracing::debug!(
                    "Dropping unauthorized sort column '{}' on {}",
                    column,
                    table.table_name
                );
                String::new()
            }
            None => String::new(),
        };

        let offset = u64::from(params.page.saturating_sub(1)) * u64::from(params.page_size);
        let count_sql = format!("SELECT COUNT(*) FROM {}{}", source, where_clause);
        let data_sql = format!(
            "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
            projection, source, where_clause, order_clause, params.page_size, offset
        );

        Self {
            count_sql,
            data_sql,
            params: bound,
            page: params.page,
            page_size: params.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortOrder;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn table() -> TableRecord {
        TableRecord {
            id: Uuid::new_v4(),
            name: "orders".into(),
            state: ResourceState::Active,
            database_name: "sales".into(),
            table_name: "orders".into(),
            display_name: None,
            description: None,
            connection_id: Uuid::new_v4(),
        }
    }

    fn column(name: &str, position: i32) -> ColumnRecord {
        ColumnRecord {
            seq: i64::from(position),
            table_id: Uuid::new_v4(),
            column_name: name.into(),
            display_name: None,
            data_type: "text".into(),
            ordinal_position: position,
            is_nullable: Some("YES".into()),
            state: ResourceState::Active,
            column_default: None,
            description: None,
        }
    }

    fn columns() -> Vec<ColumnRecord> {
        vec![column("id", 1), column("status", 2), column("total", 3)]
    }

    #[test]
    fn test_defaults_project_registered_columns_first_page() {
        let plan = QueryPlan::build(&table(), &columns(), &QueryParams::default(), Dialect::Sqlite);
        assert_eq!(plan.count_sql, "SELECT COUNT(*) FROM sales.orders");
        assert_eq!(
            plan.data_sql,
            "SELECT id, status, total FROM sales.orders LIMIT 20 OFFSET 0"
        );
        assert!(plan.params.is_empty());
    }

    #[test]
    fn test_fallback_projection_follows_ordinal_order() {
        let shuffled = vec![column("total", 3), column("id", 1), column("status", 2)];
        let plan = QueryPlan::build(&table(), &shuffled, &QueryParams::default(), Dialect::Sqlite);
        assert!(plan.data_sql.starts_with("SELECT id, status, total FROM"));
    }

    #[test]
    fn test_unknown_filter_keys_are_dropped() {
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("shipped"));
        filters.insert("1=1; DROP TABLE orders".to_string(), json!("x"));
        let params = QueryParams {
            filters: Some(filters),
            ..Default::default()
        };

        let plan = QueryPlan::build(&table(), &columns(), &params, Dialect::Sqlite);
        assert_eq!(
            plan.count_sql,
            "SELECT COUNT(*) FROM sales.orders WHERE status = ?"
        );
        assert_eq!(plan.params, vec![json!("shipped")]);
        assert!(!plan.data_sql.contains("DROP TABLE"));
    }

    #[test]
    fn test_postgres_placeholders_are_numbered() {
        let mut filters = BTreeMap::new();
        filters.insert("id".to_string(), json!(7));
        filters.insert("status".to_string(), json!("open"));
        let params = QueryParams {
            filters: Some(filters),
            ..Default::default()
        };

        let plan = QueryPlan::build(&table(), &columns(), &params, Dialect::Postgres);
        // BTreeMap iteration gives deterministic predicate order
        assert_eq!(
            plan.count_sql,
            "SELECT COUNT(*) FROM sales.orders WHERE id = $1 AND status = $2"
        );
        assert_eq!(plan.params, vec![json!(7), json!("open")]);
    }

    #[test]
    fn test_projection_keeps_order_and_drops_unknown() {
        let params = QueryParams {
            select_fields: Some(vec![
                "total".into(),
                "password".into(),
                "id".into(),
            ]),
            ..Default::default()
        };
        let plan = QueryPlan::build(&table(), &columns(), &params, Dialect::Sqlite);
        assert!(plan.data_sql.starts_with("SELECT total, id FROM"));
    }

    #[test]
    fn test_all_unknown_projection_falls_back_to_registered_set() {
        let params = QueryParams {
            select_fields: Some(vec!["nope".into(), "nada".into()]),
            ..Default::default()
        };
        let plan = QueryPlan::build(&table(), &columns(), &params, Dialect::Sqlite);
        assert!(plan.data_sql.starts_with("SELECT id, status, total FROM"));
        assert!(!plan.data_sql.contains('*'));
    }

    #[test]
    fn test_unauthorized_sort_is_dropped() {
        let params = QueryParams {
            sort_by: Some("sneaky".into()),
            sort_order: SortOrder::Desc,
            ..Default::default()
        };
        let plan = QueryPlan::build(&table(), &columns(), &params, Dialect::Sqlite);
        assert!(!plan.data_sql.contains("ORDER BY"));
    }

    #[test]
    fn test_deleted_columns_do_not_authorize() {
        let mut cols = columns();
        cols[1].state = ResourceState::Deleted;
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("shipped"));
        let params = QueryParams {
            filters: Some(filters),
            sort_by: Some("status".into()),
            ..Default::default()
        };
        let plan = QueryPlan::build(&table(), &cols, &params, Dialect::Sqlite);
        assert!(!plan.data_sql.contains("WHERE"));
        assert!(!plan.data_sql.contains("ORDER BY"));
        assert!(plan.data_sql.starts_with("SELECT id, total FROM"));
    }

    #[test]
    fn test_second_page_with_sort() {
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("shipped"));
        let params = QueryParams {
            filters: Some(filters),
            sort_by: Some("total".into()),
            sort_order: SortOrder::Desc,
            page: 2,
            page_size: 10,
            select_fields: None,
        };
        let plan = QueryPlan::build(&table(), &columns(), &params, Dialect::Postgres);
        assert_eq!(
            plan.data_sql,
            "SELECT id, status, total FROM sales.orders WHERE status = $1 ORDER BY total DESC LIMIT 10 OFFSET 10"
        );
    }

    #[test]
    fn test_page_zero_clamps_to_zero_offset() {
        let params = QueryParams {
            page: 0,
            page_size: 10,
            ..Default::default()
        };
        let plan = QueryPlan::build(&table(), &columns(), &params, Dialect::Sqlite);
        assert!(plan.data_sql.ends_with("LIMIT 10 OFFSET 0"));
    }
}
