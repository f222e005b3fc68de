//! Generic resource registry.
//!
//! CRUD plus soft delete over the polymorphic base entity. Subtype
//! registries (connections, metadata tables) layer their own tables on top
//! of this one, correlated by a shared identifier.

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::models::{ResourceRecord, ResourceState, ResourceType, ResourceUpdate};

use super::{parse_resource_type, parse_state, parse_uuid};

/// Conjunctive filters for resource listing.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub resource_type: Option<ResourceType>,
    pub state: Option<ResourceState>,
    pub created_by: Option<Uuid>,
}

/// Registry over the base `resources` table.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    pool: SqlitePool,
}

impl ResourceStore {
    /// Creates a registry over the given catalog pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a base resource row.
    ///
    /// The identifier may be pre-allocated by the caller so a subtype row
    /// can be correlated with it; when omitted a fresh v4 UUID is used.
    /// No name-uniqueness check happens at this layer.
    pub async fn create(
        &self,
        name: &str,
        resource_type: ResourceType,
        created_by: Uuid,
        state: ResourceState,
        id: Option<Uuid>,
    ) -> Result<ResourceRecord> {
        let record = new_record(name, resource_type, created_by, state, id);
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| CatalogError::storage("Failed to acquire store connection", e))?;
        insert_base(&mut conn, &record).await?;
        tracing::debug!(
            "Created resource {} ({}, state {})",
            record.id,
            record.resource_type,
            record.state
        );
        Ok(record)
    }

    /// Fetches one resource by id; absence is `Ok(None)`.
    pub async fn get(&self, id: Uuid) -> Result<Option<ResourceRecord>> {
        let row = sqlx::query(
            "SELECT id, name, type, state, created_by, created_at, updated_at
             FROM resources WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to fetch resource", e))?;

        row.map(|r| decode_resource(&r)).transpose()
    }

    /// Lists resources with conjunctive filters and offset pagination.
    ///
    /// No stable ordering is guaranteed; callers needing one must sort by
    /// creation order themselves.
    pub async fn list(
        &self,
        skip: i64,
        limit: i64,
        filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>> {
        let mut sql = String::from(
            "SELECT id, name, type, state, created_by, created_at, updated_at FROM resources",
        );
        let mut binds: Vec<String> = Vec::new();

        let mut conditions: Vec<&str> = Vec::new();
        if let Some(ty) = filter.resource_type {
            conditions.push("type = ?");
            binds.push(ty.as_str().to_string());
        }
        if let Some(state) = filter.state {
            conditions.push("state = ?");
            binds.push(state.as_str().to_string());
        }
        if let Some(creator) = filter.created_by {
            conditions.push("created_by = ?");
            binds.push(creator.to_string());
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list resources", e))?;

        rows.iter().map(decode_resource).collect()
    }

    /// Lists resources of one type.
    pub async fn list_by_type(
        &self,
        resource_type: ResourceType,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ResourceRecord>> {
        self.list(
            skip,
            limit,
            &ResourceFilter {
                resource_type: Some(resource_type),
                ..Default::default()
            },
        )
        .await
    }

    /// Lists resources created by one user.
    pub async fn list_by_creator(
        &self,
        created_by: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ResourceRecord>> {
        self.list(
            skip,
            limit,
            &ResourceFilter {
                created_by: Some(created_by),
                ..Default::default()
            },
        )
        .await
    }

    /// Applies a whitelist update to the base row.
    ///
    /// Only `name` and `state` may change; the identifier and the subtype
    /// discriminator are immutable. Absence is `Ok(None)`.
    pub async fn update(&self, id: Uuid, update: &ResourceUpdate) -> Result<Option<ResourceRecord>> {
        let Some(mut record) = self.get(id).await? else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            record.name = name.clone();
        }
        if let Some(state) = update.state {
            record.state = state;
        }
        record.updated_at = Utc::now();

        sqlx::query("UPDATE resources SET name = ?, state = ?, updated_at = ? WHERE id = ?")
            .bind(&record.name)
            .bind(record.state.as_str())
            .bind(record.updated_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to update resource", e))?;

        Ok(Some(record))
    }

    /// Soft-deletes a resource by marking its state `Deleted`.
    ///
    /// Returns `true` iff the resource existed; deleting an already-deleted
    /// resource succeeds and leaves it `Deleted`.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let updated = self
            .update(
                id,
                &ResourceUpdate {
                    state: Some(ResourceState::Deleted),
                    ..Default::default()
                },
            )
            .await?;
        Ok(updated.is_some())
    }
}

/// Builds an in-memory record ready for insertion.
pub(crate) fn new_record(
    name: &str,
    resource_type: ResourceType,
    created_by: Uuid,
    state: ResourceState,
    id: Option<Uuid>,
) -> ResourceRecord {
    let now = Utc::now();
    ResourceRecord {
        id: id.unwrap_or_else(Uuid::new_v4),
        name: name.to_string(),
        resource_type,
        state,
        created_by,
        created_at: now,
        updated_at: now,
    }
}

/// Inserts a base row on an arbitrary connection, so subtype registries can
/// write base and subtype rows inside one transaction.
pub(crate) async fn insert_base(
    conn: &mut SqliteConnection,
    record: &ResourceRecord,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO resources (id, name, type, state, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(&record.name)
    .bind(record.resource_type.as_str())
    .bind(record.state.as_str())
    .bind(record.created_by.to_string())
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(conn)
    .await
    .map_err(|e| CatalogError::storage("Failed to insert resource", e))?;
    Ok(())
}

fn decode_resource(row: &sqlx::sqlite::SqliteRow) -> Result<ResourceRecord> {
    let id: String = row
        .try_get("id")
        .map_err(|e| CatalogError::storage("Failed to decode resource row", e))?;
    let name: String = row
        .try_get("name")
        .map_err(|e| CatalogError::storage("Failed to decode resource row", e))?;
    let ty: String = row
        .try_get("type")
        .map_err(|e| CatalogError::storage("Failed to decode resource row", e))?;
    let state: String = row
        .try_get("state")
        .map_err(|e| CatalogError::storage("Failed to decode resource row", e))?;
    let created_by: String = row
        .try_get("created_by")
        .map_err(|e| CatalogError::storage("Failed to decode resource row", e))?;
    let created_at = row
        .try_get("created_at")
        .map_err(|e| CatalogError::storage("Failed to decode resource row", e))?;
    let updated_at = row
        .try_get("updated_at")
        .map_err(|e| CatalogError::storage("Failed to decode resource row", e))?;

    Ok(ResourceRecord {
        id: parse_uuid(&id, "id")?,
        name,
        resource_type: parse_resource_type(&ty)?,
        state: parse_state(&state)?,
        created_by: parse_uuid(&created_by, "created_by")?,
        created_at,
        updated_at,
    })
}
