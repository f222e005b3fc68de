//! Database-connection registry.
//!
//! Connections are resources of type `connector`; the base row and the
//! subtype row are written in one transaction so a fault can never leave an
//! orphan on either side. This registry owns credential obfuscation: the
//! stored password is either null or the keyed output of
//! [`crate::security::obfuscate`], never cleartext.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::models::{
    ConnectionRecord, ConnectionSpec, ConnectionUpdate, DatabaseType, ResourceState,
    ResourceType, ResourceUpdate,
};
use crate::security::{deobfuscate, obfuscate};

use super::resources::{insert_base, new_record, ResourceStore};
use super::{parse_db_type, parse_state, parse_uuid};

const SELECT_CONNECTION: &str = "SELECT c.id, r.name, r.state, c.db_type, c.host, c.port,
        c.database_name, c.username
     FROM resources_database_connections c
     JOIN resources r ON r.id = c.id";

/// Registry over `resources_database_connections`.
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    pool: SqlitePool,
    resources: ResourceStore,
    datasource_key: Option<String>,
}

impl ConnectionStore {
    /// Creates a registry; `datasource_key` is the server-held obfuscation
    /// key (connections are stored with a null password when it is absent).
    pub fn new(pool: SqlitePool, datasource_key: Option<String>) -> Self {
        let resources = ResourceStore::new(pool.clone());
        Self {
            pool,
            resources,
            datasource_key,
        }
    }

    fn obfuscated(&self, password: Option<&str>) -> Option<String> {
        match (password, self.datasource_key.as_deref()) {
            (Some(password), Some(key)) => obfuscate(password, key),
            _ => None,
        }
    }

    /// Registers a new connection.
    ///
    /// Writes the base resource row (type `connector`, state `Pending`) and
    /// the subtype row in one transaction. A pre-allocated id may be
    /// supplied by the caller.
    pub async fn create(
        &self,
        spec: &ConnectionSpec,
        created_by: Uuid,
        id: Option<Uuid>,
    ) -> Result<ConnectionRecord> {
        let record = new_record(
            &spec.name,
            ResourceType::Connector,
            created_by,
            ResourceState::Pending,
            id,
        );
        let stored_password = self.obfuscated(spec.password.as_deref());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CatalogError::storage("Failed to begin transaction", e))?;

        insert_base(&mut *tx, &record).await?;
        sqlx::query(
            "INSERT INTO resources_database_connections
                (id, db_type, host, port, database_name, username, password)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(spec.db_type.as_str())
        .bind(&spec.host)
        .bind(spec.port.map(i64::from))
        .bind(&spec.database)
        .bind(&spec.username)
        .bind(&stored_password)
        .execute(&mut *tx)
        .await
        .map_err(|e| CatalogError::storage("Failed to insert connection", e))?;

        tx.commit()
            .await
            .map_err(|e| CatalogError::storage("Failed to commit connection", e))?;

        tracing::info!(
            "Registered {} connection '{}' ({})",
            spec.db_type,
            spec.name,
            record.id
        );

        Ok(ConnectionRecord {
            id: record.id,
            name: record.name,
            state: record.state,
            db_type: spec.db_type,
            host: spec.host.clone(),
            port: spec.port,
            database: spec.database.clone(),
            username: spec.username.clone(),
        })
    }

    /// Fetches one connection by id; absence is `Ok(None)`.
    pub async fn get(&self, id: Uuid) -> Result<Option<ConnectionRecord>> {
        let sql = format!("{} WHERE c.id = ?", SELECT_CONNECTION);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to fetch connection", e))?;
        row.map(|r| decode_connection(&r)).transpose()
    }

    /// Lists connections with offset pagination.
    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<ConnectionRecord>> {
        let sql = format!("{} LIMIT ? OFFSET ?", SELECT_CONNECTION);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list connections", e))?;
        rows.iter().map(decode_connection).collect()
    }

    /// Lists connections of one engine type.
    pub async fn list_by_type(&self, db_type: DatabaseType) -> Result<Vec<ConnectionRecord>> {
        let sql = format!("{} WHERE c.db_type = ?", SELECT_CONNECTION);
        let rows = sqlx::query(&sql)
            .bind(db_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list connections", e))?;
        rows.iter().map(decode_connection).collect()
    }

    /// Lists connections whose base resource is active.
    pub async fn list_active(&self) -> Result<Vec<ConnectionRecord>> {
        let sql = format!("{} WHERE r.state = 'A'", SELECT_CONNECTION);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list connections", e))?;
        rows.iter().map(decode_connection).collect()
    }

    /// Applies a field patch.
    ///
    /// `name`/`state` are routed through the resource registry; subtype
    /// fields patch the connection row. A supplied plaintext password is
    /// re-obfuscated with the datasource key, exactly as on creation.
    pub async fn update(
        &self,
        id: Uuid,
        update: &ConnectionUpdate,
    ) -> Result<Option<ConnectionRecord>> {
        if self.get(id).await?.is_none() {
            return Ok(None);
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
        if let Some(host) = &update.host {
            assignments.push("host = ?");
            binds.push(Some(host.clone()));
        }
        if let Some(port) = update.port {
            assignments.push("port = ?");
            binds.push(Some(port.to_string()));
        }
        if let Some(database) = &update.database {
            assignments.push("database_name = ?");
            binds.push(Some(database.clone()));
        }
        if let Some(username) = &update.username {
            assignments.push("username = ?");
            binds.push(Some(username.clone()));
        }
        if let Some(password) = &update.password {
            assignments.push("password = ?");
            binds.push(self.obfuscated(Some(password)));
        }

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE resources_database_connections SET {} WHERE id = ?",
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
                .map_err(|e| CatalogError::storage("Failed to update connection", e))?;
        }

        self.get(id).await
    }

    /// Hard-deletes the subtype row only.
    ///
    /// The base resource row keeps its own soft-delete lifecycle; use
    /// [`ConnectionStore::delete_full`] to do both at once.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM resources_database_connections WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to delete connection", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes the subtype row and soft-deletes the base row in one
    /// transaction.
    pub async fn delete_full(&self, id: Uuid) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CatalogError::storage("Failed to begin transaction", e))?;

        let removed = sqlx::query("DELETE FROM resources_database_connections WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogError::storage("Failed to delete connection", e))?
            .rows_affected()
            > 0;

        sqlx::query("UPDATE resources SET state = 'D' WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogError::storage("Failed to soft-delete resource", e))?;

        tx.commit()
            .await
            .map_err(|e| CatalogError::storage("Failed to commit delete", e))?;
        Ok(removed)
    }

    /// Probes the live target of a registered connection.
    ///
    /// Returns `Ok(None)` for an unknown connection; a reachable-or-not
    /// outcome is always a value, never an error.
    pub async fn test_connection(
        &self,
        id: Uuid,
        timeout: std::time::Duration,
    ) -> Result<Option<crate::models::ConnectionTestResult>> {
        let Some(conn) = self.get(id).await? else {
            return Ok(None);
        };
        let creds = crate::security::Credentials::new(
            conn.username.clone().unwrap_or_default(),
            self.plaintext_password(id).await?,
        );
        Ok(Some(
            crate::connectors::test_connection(&conn, creds.password(), timeout).await,
        ))
    }

    /// Probes an unsaved connection configuration with the credentials the
    /// caller supplies.
    ///
    /// Nothing is written; the plaintext password lives only for the
    /// duration of the handshake. This is the pre-registration check a
    /// client runs before committing a connection to the catalog.
    pub async fn test_spec(
        &self,
        spec: &ConnectionSpec,
        timeout: std::time::Duration,
    ) -> crate::models::ConnectionTestResult {
        let candidate = ConnectionRecord {
            id: Uuid::nil(),
            name: spec.name.clone(),
            state: ResourceState::Pending,
            db_type: spec.db_type,
            host: spec.host.clone(),
            port: spec.port,
            database: spec.database.clone(),
            username: spec.username.clone(),
        };
        let creds = crate::security::Credentials::new(
            spec.username.clone().unwrap_or_default(),
            spec.password.clone(),
        );
        crate::connectors::test_connection(&candidate, creds.password(), timeout).await
    }

    /// Reads live column descriptors for a table reachable through this
    /// connection.
    ///
    /// `None` covers both an unknown connection and an upstream fault; the
    /// caller falls back to manual column entry either way.
    pub async fn introspect_columns(
        &self,
        id: Uuid,
        database_name: &str,
        table_name: &str,
        timeout: std::time::Duration,
    ) -> Result<Option<Vec<crate::models::ColumnSpec>>> {
        let Some(conn) = self.get(id).await? else {
            tracing::warn!("Introspection requested through unknown connection {}", id);
            return Ok(None);
        };
        let creds = crate::security::Credentials::new(
            conn.username.clone().unwrap_or_default(),
            self.plaintext_password(id).await?,
        );
        Ok(crate::connectors::introspect_columns(
            &conn,
            creds.password(),
            database_name,
            table_name,
            timeout,
        )
        .await)
    }

    /// Recovers the plaintext password for a live handshake.
    ///
    /// Returns `None` when no password is stored, no key is configured, or
    /// the stored value does not decode under the key.
    pub(crate) async fn plaintext_password(&self, id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT password FROM resources_database_connections WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to fetch stored password", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let stored: Option<String> = row
            .try_get("password")
            .map_err(|e| CatalogError::storage("Failed to decode stored password", e))?;

        Ok(match (stored, self.datasource_key.as_deref()) {
            (Some(stored), Some(key)) => deobfuscate(&stored, key),
            _ => None,
        })
    }
}

fn decode_connection(row: &sqlx::sqlite::SqliteRow) -> Result<ConnectionRecord> {
    let decode_err = |e| CatalogError::storage("Failed to decode connection row", e);

    let id: String = row.try_get("id").map_err(decode_err)?;
    let name: String = row.try_get("name").map_err(decode_err)?;
    let state: String = row.try_get("state").map_err(decode_err)?;
    let db_type: String = row.try_get("db_type").map_err(decode_err)?;
    let host: String = row.try_get("host").map_err(decode_err)?;
    let port: Option<i64> = row.try_get("port").map_err(decode_err)?;
    let database: Option<String> = row.try_get("database_name").map_err(decode_err)?;
    let username: Option<String> = row.try_get("username").map_err(decode_err)?;

    Ok(ConnectionRecord {
        id: parse_uuid(&id, "id")?,
        name,
        state: parse_state(&state)?,
        db_type: parse_db_type(&db_type)?,
        host,
        port: port.and_then(|p| u16::try_from(p).ok()),
        database,
        username,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{connect, migrate};
    use sqlx::Row;

    async fn store_with_key(key: Option<&str>) -> ConnectionStore {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        ConnectionStore::new(pool, key.map(String::from))
    }

    fn spec(password: Option<&str>) -> ConnectionSpec {
        ConnectionSpec {
            name: "warehouse".into(),
            db_type: DatabaseType::PostgreSql,
            host: "db.internal".into(),
            port: Some(5432),
            database: Some("analytics".into()),
            username: Some("reader".into()),
            password: password.map(String::from),
        }
    }

    async fn stored_password(store: &ConnectionStore, id: Uuid) -> Option<String> {
        sqlx::query("SELECT password FROM resources_database_connections WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .try_get("password")
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_obfuscates_password() {
        let store = store_with_key(Some("server-key")).await;
        let created = store
            .create(&spec(Some("hunter2")), Uuid::new_v4(), None)
            .await
            .unwrap();

        let stored = stored_password(&store, created.id).await.unwrap();
        assert_ne!(stored, "hunter2");
        assert_eq!(
            store.plaintext_password(created.id).await.unwrap().as_deref(),
            Some("hunter2")
        );
    }

    #[tokio::test]
    async fn test_create_without_key_stores_null() {
        let store = store_with_key(None).await;
        let created = store
            .create(&spec(Some("hunter2")), Uuid::new_v4(), None)
            .await
            .unwrap();
        assert!(stored_password(&store, created.id).await.is_none());
        assert!(store.plaintext_password(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_writes_base_row() {
        let store = store_with_key(None).await;
        let created = store
            .create(&spec(None), Uuid::new_v4(), None)
            .await
            .unwrap();

        let resources = ResourceStore::new(store.pool.clone());
        let base = resources.get(created.id).await.unwrap().unwrap();
        assert_eq!(base.resource_type, ResourceType::Connector);
        assert_eq!(base.state, ResourceState::Pending);
        assert_eq!(base.name, "warehouse");
    }

    #[tokio::test]
    async fn test_update_reobfuscates_password() {
        let store = store_with_key(Some("server-key")).await;
        let created = store
            .create(&spec(Some("old-pass")), Uuid::new_v4(), None)
            .await
            .unwrap();

        store
            .update(
                created.id,
                &ConnectionUpdate {
                    password: Some("new-pass".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        let stored = stored_password(&store, created.id).await.unwrap();
        assert_ne!(stored, "new-pass");
        assert_eq!(
            store.plaintext_password(created.id).await.unwrap().as_deref(),
            Some("new-pass")
        );
    }

    #[tokio::test]
    async fn test_update_routes_base_fields() {
        let store = store_with_key(None).await;
        let created = store
            .create(&spec(None), Uuid::new_v4(), None)
            .await
            .unwrap();

        let updated = store
            .update(
                created.id,
                &ConnectionUpdate {
                    name: Some("renamed".into()),
                    state: Some(ResourceState::Active),
                    host: Some("replica.internal".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.state, ResourceState::Active);
        assert_eq!(updated.host, "replica.internal");
    }

    #[tokio::test]
    async fn test_list_variants() {
        let store = store_with_key(None).await;
        let a = store.create(&spec(None), Uuid::new_v4(), None).await.unwrap();
        let mut mongo = spec(None);
        mongo.name = "events".into();
        mongo.db_type = DatabaseType::MongoDb;
        store.create(&mongo, Uuid::new_v4(), None).await.unwrap();

        assert_eq!(store.list(0, 100).await.unwrap().len(), 2);
        let pg = store.list_by_type(DatabaseType::PostgreSql).await.unwrap();
        assert_eq!(pg.len(), 1);
        assert_eq!(pg[0].id, a.id);

        // Nothing active yet, then activate one
        assert!(store.list_active().await.unwrap().is_empty());
        store
            .update(
                a.id,
                &ConnectionUpdate {
                    state: Some(ResourceState::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spec_probe_reports_failure_and_persists_nothing() {
        let store = store_with_key(None).await;
        let mut candidate = spec(Some("throwaway"));
        candidate.host = "127.0.0.1".into();
        candidate.port = Some(9);

        let result = store
            .test_spec(&candidate, std::time::Duration::from_secs(1))
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(store.list(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_hard_on_subtype_only() {
        let store = store_with_key(None).await;
        let created = store.create(&spec(None), Uuid::new_v4(), None).await.unwrap();

        assert!(store.delete(created.id).await.unwrap());
        assert!(store.get(created.id).await.unwrap().is_none());
        assert!(!store.delete(created.id).await.unwrap());

        // Base row survives a subtype-only delete
        let resources = ResourceStore::new(store.pool.clone());
        assert!(resources.get(created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_full() {
        let store = store_with_key(None).await;
        let created = store.create(&spec(None), Uuid::new_v4(), None).await.unwrap();

        assert!(store.delete_full(created.id).await.unwrap());
        assert!(store.get(created.id).await.unwrap().is_none());

        let resources = ResourceStore::new(store.pool.clone());
        let base = resources.get(created.id).await.unwrap().unwrap();
        assert_eq!(base.state, ResourceState::Deleted);
    }
}
