//! Core data models for the catalog.
//!
//! Every registered asset is a `Resource`; concrete kinds (database
//! connections, metadata tables) extend the base record by sharing its
//! identifier with a subtype row. Workspaces are the tenant boundary and own
//! resources and user memberships through join rows with their own
//! lifecycles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of resource kinds known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Connector,
    ComputeNode,
    Metadata,
}

impl ResourceType {
    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Connector => "connector",
            ResourceType::ComputeNode => "compute_node",
            ResourceType::Metadata => "metadata",
        }
    }

    /// Parses the storage representation back into a type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connector" => Some(ResourceType::Connector),
            "compute_node" => Some(ResourceType::ComputeNode),
            "metadata" => Some(ResourceType::Metadata),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state shared by resources, columns and workspace join rows.
///
/// Persisted as a single character (`A`/`P`/`D`). Deletion is soft: rows are
/// marked `Deleted` and never physically removed by the registry itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    Active,
    Pending,
    Deleted,
}

impl ResourceState {
    /// Stable one-character storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Active => "A",
            ResourceState::Pending => "P",
            ResourceState::Deleted => "D",
        }
    }

    /// Parses the one-character storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(ResourceState::Active),
            "P" => Some(ResourceState::Pending),
            "D" => Some(ResourceState::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base record for every registered asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub state: ResourceState,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whitelist of base-resource fields that may change after creation.
///
/// The identifier and the subtype discriminator are immutable; anything not
/// listed here is silently ignored by the update path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub name: Option<String>,
    pub state: Option<ResourceState>,
}

/// Supported connector engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSql,
    MySql,
    MongoDb,
}

impl DatabaseType {
    /// Stable storage representation, matching the connection URL scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSql => "postgresql",
            DatabaseType::MySql => "mysql",
            DatabaseType::MongoDb => "mongodb",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "postgresql" => Some(DatabaseType::PostgreSql),
            "mysql" => Some(DatabaseType::MySql),
            "mongodb" => Some(DatabaseType::MongoDb),
            _ => None,
        }
    }

    /// Default port for the engine.
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::PostgreSql => 5432,
            DatabaseType::MySql => 3306,
            DatabaseType::MongoDb => 27017,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload for registering a new database connection.
///
/// The plaintext password only exists in transit; it is obfuscated before it
/// reaches storage and never echoed back by any read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub name: String,
    pub db_type: DatabaseType,
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Read model for a registered connection.
///
/// Intentionally excludes the stored password in any form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: Uuid,
    pub name: String,
    pub state: ResourceState,
    pub db_type: DatabaseType,
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
}

/// Field patch for a registered connection.
///
/// A supplied plaintext password is re-obfuscated before storage, exactly as
/// on creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    pub name: Option<String>,
    pub state: Option<ResourceState>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Outcome of a live connection handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    /// A successful handshake.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed handshake with a sanitized message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Payload for registering a metadata table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub database_name: String,
    pub table_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub connection_id: Uuid,
}

/// Read model for a registered metadata table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRecord {
    pub id: Uuid,
    pub name: String,
    pub state: ResourceState,
    pub database_name: String,
    pub table_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub connection_id: Uuid,
}

/// Table descriptor together with its ordered column descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableWithColumns {
    #[serde(flatten)]
    pub table: TableRecord,
    pub columns: Vec<ColumnRecord>,
}

/// Field patch for a metadata table.
///
/// `name` and `state` belong to the base resource row and are routed through
/// the resource registry; the remaining fields patch the subtype row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableUpdate {
    pub name: Option<String>,
    pub state: Option<ResourceState>,
    pub database_name: Option<String>,
    pub table_name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub connection_id: Option<Uuid>,
}

/// Payload for describing one column of a metadata table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column_name: String,
    pub display_name: Option<String>,
    pub data_type: String,
    pub ordinal_position: i32,
    pub is_nullable: Option<String>,
    pub column_default: Option<String>,
    pub description: Option<String>,
}

/// Read model for a table column.
///
/// `seq` is the store-assigned monotonic surrogate key; `ordinal_position`
/// defines the canonical column order and is advisory, not necessarily
/// contiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub seq: i64,
    pub table_id: Uuid,
    pub column_name: String,
    pub display_name: Option<String>,
    pub data_type: String,
    pub ordinal_position: i32,
    pub is_nullable: Option<String>,
    pub state: ResourceState,
    pub column_default: Option<String>,
    pub description: Option<String>,
}

/// Field patch for a table column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnUpdate {
    pub column_name: Option<String>,
    pub display_name: Option<String>,
    pub data_type: Option<String>,
    pub ordinal_position: Option<i32>,
    pub is_nullable: Option<String>,
    pub state: Option<ResourceState>,
    pub column_default: Option<String>,
    pub description: Option<String>,
}

/// Sort direction for dynamic queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// SQL keyword for the direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

/// Generic filter/sort/pagination request against a registered table.
///
/// Filter keys are column names checked against the table's authorized
/// column set; unknown keys are dropped, never interpolated. Values are
/// always bound as parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub filters: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub select_fields: Option<Vec<String>>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            filters: None,
            sort_by: None,
            sort_order: SortOrder::Asc,
            page: 1,
            page_size: 20,
            select_fields: None,
        }
    }
}

/// Paginated result of a dynamic table query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDataResponse {
    pub data: Vec<serde_json::Map<String, Value>>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: i64,
}

/// Tenant boundary owning resources and user memberships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    pub name: String,
    pub description: Option<String>,
}

/// Field patch for a workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Membership join row between a workspace and a user.
///
/// Carries its own state so a user can be deactivated from a workspace
/// without deleting either side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceUserRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attachment join row between a workspace and a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceResourceRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub resource_id: Uuid,
    pub state: ResourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
