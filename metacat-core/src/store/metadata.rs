//! Metadata catalog: table and column descriptions.
//!
//! A registered table is the schema-of-record for dynamic queries; its
//! column list is the sole allow-list for generated SQL identifiers, so
//! every identifier is validated on the way in. The base resource row and
//! the subtype row are written in one transaction.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::models::{
    ColumnRecord, ColumnSpec, ColumnUpdate, ResourceState, ResourceType, ResourceUpdate,
    TableRecord, TableSpec, TableUpdate, TableWithColumns,
};

use super::resources::{insert_base, new_record, ResourceStore};
use super::{parse_state, parse_uuid, validate_identifier};

const SELECT_TABLE: &str = "SELECT t.id, r.name, r.state, t.database_name, t.table_name,
        t.display_name, t.description, t.connection_id
     FROM resources_metadata_tables t
     JOIN resources r ON r.id = t.id";

const SELECT_COLUMN: &str = "SELECT seq, table_id, column_name, display_name, data_type,
        ordinal_position, is_nullable, state, column_default, description
     FROM resources_metadata_table_columns";

/// Registry over `resources_metadata_tables` and its column table.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
    resources: ResourceStore,
}

impl MetadataStore {
    /// Creates a registry over the given catalog pool.
    pub fn new(pool: SqlitePool) -> Self {
        let resources = ResourceStore::new(pool.clone());
        Self { pool, resources }
    }

    /// Registers a metadata table.
    ///
    /// Writes the base resource row (type `metadata`, state `Pending`) and
    /// the subtype row in one transaction; the caller may pre-allocate the
    /// identifier.
    ///
    /// # Errors
    /// Rejects malformed `database_name`/`table_name` identifiers before
    /// anything is written.
    pub async fn create_table(
        &self,
        spec: &TableSpec,
        created_by: Uuid,
        id: Option<Uuid>,
    ) -> Result<TableRecord> {
        validate_identifier("database name", &spec.database_name)?;
        validate_identifier("table name", &spec.table_name)?;

        let record = new_record(
            &spec.name,
            ResourceType::Metadata,
            created_by,
            ResourceState::Pending,
            id,
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CatalogError::storage("Failed to begin transaction", e))?;

        insert_base(&mut *tx, &record).await?;
        sqlx::query(
            "INSERT INTO resources_metadata_tables
                (id, database_name, table_name, display_name, description, connection_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&spec.database_name)
        .bind(&spec.table_name)
        .bind(&spec.display_name)
        .bind(&spec.description)
        .bind(spec.connection_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| CatalogError::storage("Failed to insert metadata table", e))?;

        tx.commit()
            .await
            .map_err(|e| CatalogError::storage("Failed to commit metadata table", e))?;

        tracing::info!(
            "Registered metadata table '{}' for {}.{} ({})",
            spec.name,
            spec.database_name,
            spec.table_name,
            record.id
        );

        Ok(TableRecord {
            id: record.id,
            name: record.name,
            state: record.state,
            database_name: spec.database_name.clone(),
            table_name: spec.table_name.clone(),
            display_name: spec.display_name.clone(),
            description: spec.description.clone(),
            connection_id: spec.connection_id,
        })
    }

    /// Fetches one table with its columns; absence is `Ok(None)`.
    pub async fn get_table(&self, id: Uuid) -> Result<Option<TableWithColumns>> {
        let sql = format!("{} WHERE t.id = ?", SELECT_TABLE);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to fetch metadata table", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let table = decode_table(&row)?;
        let columns = self.list_columns(table.id).await?;
        Ok(Some(TableWithColumns { table, columns }))
    }

    /// Fetches one table by its logical metadata name, with columns.
    ///
    /// This is the lookup the query builder authorizes against.
    pub async fn get_table_by_name(&self, table_name: &str) -> Result<Option<TableWithColumns>> {
        let sql = format!("{} WHERE t.table_name = ?", SELECT_TABLE);
        let row = sqlx::query(&sql)
            .bind(table_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to fetch metadata table", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let table = decode_table(&row)?;
        let columns = self.list_columns(table.id).await?;
        Ok(Some(TableWithColumns { table, columns }))
    }

    /// Lists tables with their columns, offset-paginated.
    pub async fn list_tables(&self, skip: i64, limit: i64) -> Result<Vec<TableWithColumns>> {
        let sql = format!("{} LIMIT ? OFFSET ?", SELECT_TABLE);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list metadata tables", e))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let table = decode_table(row)?;
            let columns = self.list_columns(table.id).await?;
            tables.push(TableWithColumns { table, columns });
        }
        Ok(tables)
    }

    /// Applies a field patch to a table.
    ///
    /// `name`/`state` belong to the base resource and are routed through
    /// the resource registry; the remaining fields patch the subtype row.
    pub async fn update_table(&self, id: Uuid, update: &TableUpdate) -> Result<Option<TableRecord>> {
        let sql = format!("{} WHERE t.id = ?", SELECT_TABLE);
        let exists = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to fetch metadata table", e))?
            .is_some();
        if !exists {
            return Ok(None);
        }

        if let Some(database_name) = &update.database_name {
            validate_identifier("database name", database_name)?;
        }
        if let Some(table_name) = &update.table_name {
            validate_identifier("table name", table_name)?;
        }

        if update.name.is_some() || update.state.is_some() {
            self.resources
                .update(
                    id,
                    &ResourceUpdate {
                        name: update.name.clone(),
                        state: update.state,
                    },
                )
                .await?;
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut binds: Vec<Option<String>> = Vec::new();
        if let Some(v) = &update.database_name {
            assignments.push("database_name = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = &update.table_name {
            assignments.push("table_name = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = &update.display_name {
            assignments.push("display_name = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = &update.description {
            assignments.push("description = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = update.connection_id {
            assignments.push("connection_id = ?");
            binds.push(Some(v.to_string()));
        }

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE resources_metadata_tables SET {} WHERE id = ?",
                assignments.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for bind in &binds {
                query = query.bind(bind);
            }
            query
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::storage("Failed to update metadata table", e))?;
        }

        Ok(self.get_table(id).await?.map(|t| t.table))
    }

    /// Soft-deletes a table by marking its base resource `Deleted`.
    ///
    /// Column rows are left untouched; they are only removed by explicit
    /// column deletes.
    pub async fn delete_table(&self, id: Uuid) -> Result<bool> {
        self.resources.delete(id).await
    }

    /// Adds a column description to a table.
    ///
    /// # Errors
    /// Rejects a malformed column identifier, and a duplicate
    /// `(table, column_name)` pair; the store has no composite constraint,
    /// so the check runs before the insert.
    pub async fn create_column(&self, table_id: Uuid, spec: &ColumnSpec) -> Result<ColumnRecord> {
        validate_identifier("column name", &spec.column_name)?;

        let duplicate: Option<i64> = sqlx::query_scalar(
            "SELECT seq FROM resources_metadata_table_columns
             WHERE table_id = ? AND column_name = ?",
        )
        .bind(table_id.to_string())
        .bind(&spec.column_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to check column uniqueness", e))?;
        if duplicate.is_some() {
            return Err(CatalogError::validation(format!(
                "column '{}' already exists on table {}",
                spec.column_name, table_id
            )));
        }

        let result = sqlx::query(
            "INSERT INTO resources_metadata_table_columns
                (table_id, column_name, display_name, data_type, ordinal_position,
                 is_nullable, state, column_default, description)
             VALUES (?, ?, ?, ?, ?, ?, 'A', ?, ?)",
        )
        .bind(table_id.to_string())
        .bind(&spec.column_name)
        .bind(&spec.display_name)
        .bind(&spec.data_type)
        .bind(spec.ordinal_position)
        .bind(&spec.is_nullable)
        .bind(&spec.column_default)
        .bind(&spec.description)
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to insert column", e))?;

        let seq = result.last_insert_rowid();
        Ok(ColumnRecord {
            seq,
            table_id,
            column_name: spec.column_name.clone(),
            display_name: spec.display_name.clone(),
            data_type: spec.data_type.clone(),
            ordinal_position: spec.ordinal_position,
            is_nullable: spec.is_nullable.clone(),
            state: ResourceState::Active,
            column_default: spec.column_default.clone(),
            description: spec.description.clone(),
        })
    }

    /// Lists a table's columns in canonical order (`ordinal_position`).
    pub async fn list_columns(&self, table_id: Uuid) -> Result<Vec<ColumnRecord>> {
        let sql = format!("{} WHERE table_id = ? ORDER BY ordinal_position", SELECT_COLUMN);
        let rows = sqlx::query(&sql)
            .bind(table_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list columns", e))?;
        rows.iter().map(decode_column).collect()
    }

    /// Applies a field patch to one column, keyed by its surrogate `seq`.
    pub async fn update_column(&self, seq: i64, update: &ColumnUpdate) -> Result<Option<ColumnRecord>> {
        if self.get_column(seq).await?.is_none() {
            return Ok(None);
        }

        if let Some(column_name) = &update.column_name {
            validate_identifier("column name", column_name)?;
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut binds: Vec<Option<String>> = Vec::new();
        if let Some(v) = &update.column_name {
            assignments.push("column_name = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = &update.display_name {
            assignments.push("display_name = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = &update.data_type {
            assignments.push("data_type = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = update.ordinal_position {
            assignments.push("ordinal_position = ?");
            binds.push(Some(v.to_string()));
        }
        if let Some(v) = &update.is_nullable {
            assignments.push("is_nullable = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = update.state {
            assignments.push("state = ?");
            binds.push(Some(v.as_str().to_string()));
        }
        if let Some(v) = &update.column_default {
            assignments.push("column_default = ?");
            binds.push(Some(v.clone()));
        }
        if let Some(v) = &update.description {
            assignments.push("description = ?");
            binds.push(Some(v.clone()));
        }

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE resources_metadata_table_columns SET {} WHERE seq = ?",
                assignments.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for bind in &binds {
                query = query.bind(bind);
            }
            query
                .bind(seq)
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::storage("Failed to update column", e))?;
        }

        self.get_column(seq).await
    }

    /// Hard-deletes one column.
    pub async fn delete_column(&self, seq: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM resources_metadata_table_columns WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to delete column", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_column(&self, seq: i64) -> Result<Option<ColumnRecord>> {
        let sql = format!("{} WHERE seq = ?", SELECT_COLUMN);
        let row = sqlx::query(&sql)
            .bind(seq)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to fetch column", e))?;
        row.map(|r| decode_column(&r)).transpose()
    }
}

fn decode_table(row: &sqlx::sqlite::SqliteRow) -> Result<TableRecord> {
    let decode_err = |e| CatalogError::storage("Failed to decode metadata table row", e);

    let id: String = row.try_get("id").map_err(decode_err)?;
    let name: String = row.try_get("name").map_err(decode_err)?;
    let state: String = row.try_get("state").map_err(decode_err)?;
    let database_name: String = row.try_get("database_name").map_err(decode_err)?;
    let table_name: String = row.try_get("table_name").map_err(decode_err)?;
    let display_name: Option<String> = row.try_get("display_name").map_err(decode_err)?;
    let description: Option<String> = row.try_get("description").map_err(decode_err)?;
    let connection_id: String = row.try_get("connection_id").map_err(decode_err)?;

    Ok(TableRecord {
        id: parse_uuid(&id, "id")?,
        name,
        state: parse_state(&state)?,
        database_name,
        table_name,
        display_name,
        description,
        connection_id: parse_uuid(&connection_id, "connection_id")?,
    })
}

fn decode_column(row: &sqlx::sqlite::SqliteRow) -> Result<ColumnRecord> {
    let decode_err = |e| CatalogError::storage("Failed to decode column row", e);

    let seq: i64 = row.try_get("seq").map_err(decode_err)?;
    let table_id: String = row.try_get("table_id").map_err(decode_err)?;
    let column_name: String = row.try_get("column_name").map_err(decode_err)?;
    let display_name: Option<String> = row.try_get("display_name").map_err(decode_err)?;
    let data_type: String = row.try_get("data_type").map_err(decode_err)?;
    let ordinal_position: i32 = row.try_get("ordinal_position").map_err(decode_err)?;
    let is_nullable: Option<String> = row.try_get("is_nullable").map_err(decode_err)?;
    let state: String = row.try_get("state").map_err(decode_err)?;
    let column_default: Option<String> = row.try_get("column_default").map_err(decode_err)?;
    let description: Option<String> = row.try_get("description").map_err(decode_err)?;

    Ok(ColumnRecord {
        seq,
        table_id: parse_uuid(&table_id, "table_id")?,
        column_name,
        display_name,
        data_type,
        ordinal_position,
        is_nullable,
        state: parse_state(&state)?,
        column_default,
        description,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{ConnectionSpec, DatabaseType};
    use crate::store::{connect, migrate, ConnectionStore};

    /// Registered tables reference a connection row, so each fixture
    /// registers one and hands back its id.
    async fn store() -> (MetadataStore, Uuid) {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let connection = ConnectionStore::new(pool.clone(), None)
            .create(
                &ConnectionSpec {
                    name: "sales-db".into(),
                    db_type: DatabaseType::PostgreSql,
                    host: "localhost".into(),
                    port: None,
                    database: Some("sales".into()),
                    username: None,
                    password: None,
                },
                Uuid::new_v4(),
                None,
            )
            .await
            .unwrap();
        (MetadataStore::new(pool), connection.id)
    }

    fn table_spec(connection_id: Uuid) -> TableSpec {
        TableSpec {
            name: "orders".into(),
            database_name: "sales".into(),
            table_name: "orders".into(),
            display_name: Some("Orders".into()),
            description: None,
            connection_id,
        }
    }

    fn column_spec(name: &str, position: i32) -> ColumnSpec {
        ColumnSpec {
            column_name: name.into(),
            display_name: None,
            data_type: "text".into(),
            ordinal_position: position,
            is_nullable: Some("YES".into()),
            column_default: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_table_writes_both_rows() {
        let (store, source) = store().await;
        let created = store
            .create_table(&table_spec(source), Uuid::new_v4(), None)
            .await
            .unwrap();

        let fetched = store.get_table(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.table.table_name, "orders");
        assert_eq!(fetched.table.state, ResourceState::Pending);
        assert!(fetched.columns.is_empty());

        let resources = ResourceStore::new(store.pool.clone());
        let base = resources.get(created.id).await.unwrap().unwrap();
        assert_eq!(base.resource_type, ResourceType::Metadata);
    }

    #[tokio::test]
    async fn test_create_table_rejects_malformed_identifier() {
        let (store, source) = store().await;
        let mut spec = table_spec(source);
        spec.table_name = "orders; DROP TABLE users".into();
        let err = store.create_table(&spec, Uuid::new_v4(), None).await;
        assert!(matches!(err, Err(CatalogError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_get_table_by_name() {
        let (store, source) = store().await;
        let created = store
            .create_table(&table_spec(source), Uuid::new_v4(), None)
            .await
            .unwrap();
        store
            .create_column(created.id, &column_spec("id", 1))
            .await
            .unwrap();

        let found = store.get_table_by_name("orders").await.unwrap().unwrap();
        assert_eq!(found.table.id, created.id);
        assert_eq!(found.columns.len(), 1);

        assert!(store.get_table_by_name("no_such").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_columns_in_ordinal_order() {
        let (store, source) = store().await;
        let table = store
            .create_table(&table_spec(source), Uuid::new_v4(), None)
            .await
            .unwrap();

        // Inserted out of order, listed in canonical order
        store.create_column(table.id, &column_spec("total", 3)).await.unwrap();
        store.create_column(table.id, &column_spec("id", 1)).await.unwrap();
        store.create_column(table.id, &column_spec("status", 2)).await.unwrap();

        let names: Vec<String> = store
            .list_columns(table.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.column_name)
            .collect();
        assert_eq!(names, vec!["id", "status", "total"]);
    }

    #[tokio::test]
    async fn test_duplicate_column_rejected() {
        let (store, source) = store().await;
        let table = store
            .create_table(&table_spec(source), Uuid::new_v4(), None)
            .await
            .unwrap();
        store.create_column(table.id, &column_spec("id", 1)).await.unwrap();

        let err = store.create_column(table.id, &column_spec("id", 2)).await;
        assert!(matches!(err, Err(CatalogError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_table_splits_base_and_subtype() {
        let (store, source) = store().await;
        let table = store
            .create_table(&table_spec(source), Uuid::new_v4(), None)
            .await
            .unwrap();

        let updated = store
            .update_table(
                table.id,
                &TableUpdate {
                    name: Some("orders_v2".into()),
                    state: Some(ResourceState::Active),
                    description: Some("all orders".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "orders_v2");
        assert_eq!(updated.state, ResourceState::Active);
        assert_eq!(updated.description.as_deref(), Some("all orders"));

        assert!(store
            .update_table(Uuid::new_v4(), &TableUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_table_is_soft_and_keeps_columns() {
        let (store, source) = store().await;
        let table = store
            .create_table(&table_spec(source), Uuid::new_v4(), None)
            .await
            .unwrap();
        store.create_column(table.id, &column_spec("id", 1)).await.unwrap();

        assert!(store.delete_table(table.id).await.unwrap());
        let fetched = store.get_table(table.id).await.unwrap().unwrap();
        assert_eq!(fetched.table.state, ResourceState::Deleted);
        // Soft delete does not cascade to columns
        assert_eq!(fetched.columns.len(), 1);
    }

    #[tokio::test]
    async fn test_column_update_and_delete() {
        let (store, source) = store().await;
        let table = store
            .create_table(&table_spec(source), Uuid::new_v4(), None)
            .await
            .unwrap();
        let column = store
            .create_column(table.id, &column_spec("status", 1))
            .await
            .unwrap();

        let updated = store
            .update_column(
                column.seq,
                &ColumnUpdate {
                    data_type: Some("varchar".into()),
                    description: Some("order status".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.data_type, "varchar");
        assert_eq!(updated.description.as_deref(), Some("order status"));

        assert!(store.delete_column(column.seq).await.unwrap());
        assert!(!store.delete_column(column.seq).await.unwrap());
        assert!(store
            .update_column(column.seq, &ColumnUpdate::default())
            .await
            .unwrap()
            .is_none());
    }
}
