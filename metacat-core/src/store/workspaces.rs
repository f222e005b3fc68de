//! Workspace registry: tenant boundaries, memberships and attachments.
//!
//! Workspaces are not resources; they live in their own table with a unique
//! name and own join rows for user memberships and resource attachments.
//! Join rows carry their own state so membership can be revoked without
//! deleting either side.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::models::{
    ResourceState, WorkspaceRecord, WorkspaceResourceRecord, WorkspaceSpec, WorkspaceUpdate,
    WorkspaceUserRecord,
};

use super::{parse_state, parse_uuid};

const SELECT_WORKSPACE: &str =
    "SELECT id, name, description, owner_id, state, created_at, updated_at FROM workspaces";

/// Registry over `workspaces` and its join tables.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    pool: SqlitePool,
}

impl WorkspaceStore {
    /// Creates a registry over the given catalog pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a workspace owned by `owner_id`.
    ///
    /// The owner is also enrolled as an active member, in one transaction.
    ///
    /// # Errors
    /// A duplicate workspace name surfaces as a validation error; the unique
    /// constraint on `name` is the authority.
    pub async fn create(&self, spec: &WorkspaceSpec, owner_id: Uuid) -> Result<WorkspaceRecord> {
        let now = Utc::now();
        let record = WorkspaceRecord {
            id: Uuid::new_v4(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            owner_id,
            state: ResourceState::Active,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CatalogError::storage("Failed to begin transaction", e))?;

        let inserted = sqlx::query(
            "INSERT INTO workspaces (id, name, description, owner_id, state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(&record.description)
        .bind(owner_id.to_string())
        .bind(record.state.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Err(CatalogError::validation(format!(
                        "workspace name '{}' is already taken",
                        spec.name
                    )));
                }
            }
            return Err(CatalogError::storage("Failed to insert workspace", e));
        }

        sqlx::query(
            "INSERT INTO workspace_users (id, workspace_id, user_id, state, created_at, updated_at)
             VALUES (?, ?, ?, 'A', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(record.id.to_string())
        .bind(owner_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| CatalogError::storage("Failed to enroll workspace owner", e))?;

        tx.commit()
            .await
            .map_err(|e| CatalogError::storage("Failed to commit workspace", e))?;

        tracing::info!("Created workspace '{}' ({})", record.name, record.id);
        Ok(record)
    }

    /// Fetches one workspace; absence is `Ok(None)`.
    pub async fn get(&self, id: Uuid) -> Result<Option<WorkspaceRecord>> {
        let sql = format!("{} WHERE id = ?", SELECT_WORKSPACE);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to fetch workspace", e))?;
        row.map(|r| decode_workspace(&r)).transpose()
    }

    /// Lists workspaces owned by one user.
    pub async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<WorkspaceRecord>> {
        let sql = format!("{} WHERE owner_id = ? AND state != 'D'", SELECT_WORKSPACE);
        let rows = sqlx::query(&sql)
            .bind(owner_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list workspaces", e))?;
        rows.iter().map(decode_workspace).collect()
    }

    /// Lists workspaces a user is an active member of, including owned ones.
    pub async fn list_joined(&self, user_id: Uuid) -> Result<Vec<WorkspaceRecord>> {
        let rows = sqlx::query(
            "SELECT w.id, w.name, w.description, w.owner_id, w.state, w.created_at, w.updated_at
             FROM workspaces w
             JOIN workspace_users wu ON wu.workspace_id = w.id
             WHERE wu.user_id = ? AND wu.state = 'A' AND w.state != 'D'",
        )
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to list joined workspaces", e))?;
        rows.iter().map(decode_workspace).collect()
    }

    /// Applies a field patch; absence is `Ok(None)`.
    pub async fn update(&self, id: Uuid, update: &WorkspaceUpdate) -> Result<Option<WorkspaceRecord>> {
        let Some(mut record) = self.get(id).await? else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            record.name = name.clone();
        }
        if let Some(description) = &update.description {
            record.description = Some(description.clone());
        }
        record.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE workspaces SET name = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.updated_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Err(CatalogError::validation(format!(
                        "workspace name '{}' is already taken",
                        record.name
                    )));
                }
            }
            return Err(CatalogError::storage("Failed to update workspace", e));
        }

        Ok(Some(record))
    }

    /// Hard-deletes a workspace and its join rows.
    ///
    /// Attached resources are left untouched; only the attachments go.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CatalogError::storage("Failed to begin transaction", e))?;

        sqlx::query("DELETE FROM workspace_users WHERE workspace_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogError::storage("Failed to delete workspace members", e))?;
        sqlx::query("DELETE FROM workspace_resources WHERE workspace_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogError::storage("Failed to delete workspace attachments", e))?;
        let result = sqlx::query("DELETE FROM workspaces WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| CatalogError::storage("Failed to delete workspace", e))?;

        tx.commit()
            .await
            .map_err(|e| CatalogError::storage("Failed to commit workspace delete", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Reports whether `user_id` owns the workspace.
    pub async fn is_owner(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .get(id)
            .await?
            .map(|w| w.owner_id == user_id)
            .unwrap_or(false))
    }

    /// Enrolls a user into a workspace.
    ///
    /// Re-adding an existing member reactivates the membership instead of
    /// creating a second join row.
    pub async fn add_user(&self, workspace_id: Uuid, user_id: Uuid) -> Result<WorkspaceUserRecord> {
        if let Some(existing) = self.get_membership(workspace_id, user_id).await? {
            if existing.state == ResourceState::Active {
                return Ok(existing);
            }
            let now = Utc::now();
            sqlx::query("UPDATE workspace_users SET state = 'A', updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(existing.id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::storage("Failed to reactivate membership", e))?;
            return Ok(WorkspaceUserRecord {
                state: ResourceState::Active,
                updated_at: now,
                ..existing
            });
        }

        let now = Utc::now();
        let record = WorkspaceUserRecord {
            id: Uuid::new_v4(),
            workspace_id,
            user_id,
            state: ResourceState::Active,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO workspace_users (id, workspace_id, user_id, state, created_at, updated_at)
             VALUES (?, ?, ?, 'A', ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(workspace_id.to_string())
        .bind(user_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to enroll workspace member", e))?;
        Ok(record)
    }

    /// Deactivates a membership without removing the join row.
    pub async fn deactivate_user(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workspace_users SET state = 'D', updated_at = ?
             WHERE workspace_id = ? AND user_id = ? AND state = 'A'",
        )
        .bind(Utc::now())
        .bind(workspace_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to deactivate membership", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Lists a workspace's active members.
    pub async fn list_users(&self, workspace_id: Uuid) -> Result<Vec<WorkspaceUserRecord>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, user_id, state, created_at, updated_at
             FROM workspace_users WHERE workspace_id = ? AND state = 'A'",
        )
        .bind(workspace_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to list workspace members", e))?;
        rows.iter().map(decode_user).collect()
    }

    /// Attaches a resource to a workspace.
    ///
    /// Re-attaching reactivates an existing attachment.
    pub async fn attach_resource(
        &self,
        workspace_id: Uuid,
        resource_id: Uuid,
    ) -> Result<WorkspaceResourceRecord> {
        if let Some(existing) = self.get_attachment(workspace_id, resource_id).await? {
            if existing.state == ResourceState::Active {
                return Ok(existing);
            }
            let now = Utc::now();
            sqlx::query("UPDATE workspace_resources SET state = 'A', updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(existing.id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::storage("Failed to reactivate attachment", e))?;
            return Ok(WorkspaceResourceRecord {
                state: ResourceState::Active,
                updated_at: now,
                ..existing
            });
        }

        let now = Utc::now();
        let record = WorkspaceResourceRecord {
            id: Uuid::new_v4(),
            workspace_id,
            resource_id,
            state: ResourceState::Active,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO workspace_resources
                (id, workspace_id, resource_id, state, created_at, updated_at)
             VALUES (?, ?, ?, 'A', ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(workspace_id.to_string())
        .bind(resource_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to attach resource", e))?;
        Ok(record)
    }

    /// Deactivates a resource attachment.
    pub async fn detach_resource(&self, workspace_id: Uuid, resource_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workspace_resources SET state = 'D', updated_at = ?
             WHERE workspace_id = ? AND resource_id = ? AND state = 'A'",
        )
        .bind(Utc::now())
        .bind(workspace_id.to_string())
        .bind(resource_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to detach resource", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Lists a workspace's active resource attachments.
    pub async fn list_resources(&self, workspace_id: Uuid) -> Result<Vec<WorkspaceResourceRecord>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, resource_id, state, created_at, updated_at
             FROM workspace_resources WHERE workspace_id = ? AND state = 'A'",
        )
        .bind(workspace_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to list workspace resources", e))?;
        rows.iter().map(decode_attachment).collect()
    }

    async fn get_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceUserRecord>> {
        let row = sqlx::query(
            "SELECT id, workspace_id, user_id, state, created_at, updated_at
             FROM workspace_users WHERE workspace_id = ? AND user_id = ?",
        )
        .bind(workspace_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to fetch membership", e))?;
        row.map(|r| decode_user(&r)).transpose()
    }

    async fn get_attachment(
        &self,
        workspace_id: Uuid,
        resource_id: Uuid,
    ) -> Result<Option<WorkspaceResourceRecord>> {
        let row = sqlx::query(
            "SELECT id, workspace_id, resource_id, state, created_at, updated_at
             FROM workspace_resources WHERE workspace_id = ? AND resource_id = ?",
        )
        .bind(workspace_id.to_string())
        .bind(resource_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::storage("Failed to fetch attachment", e))?;
        row.map(|r| decode_attachment(&r)).transpose()
    }
}

fn decode_workspace(row: &sqlx::sqlite::SqliteRow) -> Result<WorkspaceRecord> {
    let decode_err = |e| CatalogError::storage("Failed to decode workspace row", e);

    let id: String = row.try_get("id").map_err(decode_err)?;
    let name: String = row.try_get("name").map_err(decode_err)?;
    let description: Option<String> = row.try_get("description").map_err(decode_err)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode_err)?;
    let state: String = row.try_get("state").map_err(decode_err)?;
    let created_at = row.try_get("created_at").map_err(decode_err)?;
    let updated_at = row.try_get("updated_at").map_err(decode_err)?;

    Ok(WorkspaceRecord {
        id: parse_uuid(&id, "id")?,
        name,
        description,
        owner_id: parse_uuid(&owner_id, "owner_id")?,
        state: parse_state(&state)?,
        created_at,
        updated_at,
    })
}

fn decode_user(row: &sqlx::sqlite::SqliteRow) -> Result<WorkspaceUserRecord> {
    let decode_err = |e| CatalogError::storage("Failed to decode membership row", e);

    let id: String = row.try_get("id").map_err(decode_err)?;
    let workspace_id: String = row.try_get("workspace_id").map_err(decode_err)?;
    let user_id: String = row.try_get("user_id").map_err(decode_err)?;
    let state: String = row.try_get("state").map_err(decode_err)?;
    let created_at = row.try_get("created_at").map_err(decode_err)?;
    let updated_at = row.try_get("updated_at").map_err(decode_err)?;

    Ok(WorkspaceUserRecord {
        id: parse_uuid(&id, "id")?,
        workspace_id: parse_uuid(&workspace_id, "workspace_id")?,
        user_id: parse_uuid(&user_id, "user_id")?,
        state: parse_state(&state)?,
        created_at,
        updated_at,
    })
}

fn decode_attachment(row: &sqlx::sqlite::SqliteRow) -> Result<WorkspaceResourceRecord> {
    let decode_err = |e| CatalogError::storage("Failed to decode attachment row", e);

    let id: String = row.try_get("id").map_err(decode_err)?;
    let workspace_id: String = row.try_get("workspace_id").map_err(decode_err)?;
    let resource_id: String = row.try_get("resource_id").map_err(decode_err)?;
    let state: String = row.try_get("state").map_err(decode_err)?;
    let created_at = row.try_get("created_at").map_err(decode_err)?;
    let updated_at = row.try_get("updated_at").map_err(decode_err)?;

    Ok(WorkspaceResourceRecord {
        id: parse_uuid(&id, "id")?,
        workspace_id: parse_uuid(&workspace_id, "workspace_id")?,
        resource_id: parse_uuid(&resource_id, "resource_id")?,
        state: parse_state(&state)?,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::ResourceType;
    use crate::store::{connect, migrate, ResourceStore};

    async fn store() -> WorkspaceStore {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        WorkspaceStore::new(pool)
    }

    /// Attachments reference the resources table, so tests attach a real
    /// resource row rather than a bare id.
    async fn resource(store: &WorkspaceStore) -> Uuid {
        ResourceStore::new(store.pool.clone())
            .create(
                "warehouse",
                ResourceType::Connector,
                Uuid::new_v4(),
                ResourceState::Active,
                None,
            )
            .await
            .unwrap()
            .id
    }

    fn spec(name: &str) -> WorkspaceSpec {
        WorkspaceSpec {
            name: name.into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_enrolls_owner() {
        let store = store().await;
        let owner = Uuid::new_v4();
        let ws = store.create(&spec("analytics"), owner).await.unwrap();

        assert!(store.is_owner(ws.id, owner).await.unwrap());
        assert!(!store.is_owner(ws.id, Uuid::new_v4()).await.unwrap());

        let members = store.list_users(ws.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, owner);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = store().await;
        store.create(&spec("shared"), Uuid::new_v4()).await.unwrap();
        let err = store.create(&spec("shared"), Uuid::new_v4()).await;
        assert!(matches!(err, Err(CatalogError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_list_joined_includes_memberships() {
        let store = store().await;
        let owner = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let ws = store.create(&spec("team"), owner).await.unwrap();
        store.create(&spec("other"), Uuid::new_v4()).await.unwrap();

        store.add_user(ws.id, guest).await.unwrap();
        let joined = store.list_joined(guest).await.unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].id, ws.id);

        // Deactivation removes the workspace from the joined view
        assert!(store.deactivate_user(ws.id, guest).await.unwrap());
        assert!(store.list_joined(guest).await.unwrap().is_empty());

        // Re-adding reactivates the same join row
        let readded = store.add_user(ws.id, guest).await.unwrap();
        assert_eq!(readded.state, ResourceState::Active);
        assert_eq!(store.list_users(ws.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_missing() {
        let store = store().await;
        let ws = store.create(&spec("before"), Uuid::new_v4()).await.unwrap();

        let updated = store
            .update(
                ws.id,
                &WorkspaceUpdate {
                    name: Some("after".into()),
                    description: Some("renamed".into()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "after");
        assert_eq!(updated.description.as_deref(), Some("renamed"));

        assert!(store
            .update(Uuid::new_v4(), &WorkspaceUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_attach_detach_resource() {
        let store = store().await;
        let ws = store.create(&spec("data"), Uuid::new_v4()).await.unwrap();
        let resource = resource(&store).await;

        store.attach_resource(ws.id, resource).await.unwrap();
        assert_eq!(store.list_resources(ws.id).await.unwrap().len(), 1);

        assert!(store.detach_resource(ws.id, resource).await.unwrap());
        assert!(store.list_resources(ws.id).await.unwrap().is_empty());
        // Detaching twice is a no-op
        assert!(!store.detach_resource(ws.id, resource).await.unwrap());

        let again = store.attach_resource(ws.id, resource).await.unwrap();
        assert_eq!(again.state, ResourceState::Active);
        assert_eq!(store.list_resources(ws.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_join_rows() {
        let store = store().await;
        let owner = Uuid::new_v4();
        let ws = store.create(&spec("temp"), owner).await.unwrap();
        let resource = resource(&store).await;
        store.attach_resource(ws.id, resource).await.unwrap();

        assert!(store.delete(ws.id).await.unwrap());
        assert!(store.get(ws.id).await.unwrap().is_none());
        assert!(store.list_users(ws.id).await.unwrap().is_empty());
        assert!(store.list_resources(ws.id).await.unwrap().is_empty());

        assert!(!store.delete(ws.id).await.unwrap());
    }
}
