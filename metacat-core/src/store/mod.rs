//! The catalog's own persistence layer.
//!
//! All registries share one sqlx `SqlitePool`. The layout follows shared-key
//! inheritance: every concrete resource kind has exactly one base row in
//! `resources` and one subtype row keyed by the same identifier. Migrations
//! are idempotent `CREATE TABLE IF NOT EXISTS` statements applied at startup.

use std::str::FromStr;
use std::sync::OnceLock;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::models::{DatabaseType, ResourceState, ResourceType};

pub mod connections;
pub mod metadata;
pub mod resources;
pub mod workspaces;

pub use connections::ConnectionStore;
pub use metadata::MetadataStore;
pub use resources::{ResourceFilter, ResourceStore};
pub use workspaces::WorkspaceStore;

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS resources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        state TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS resources_database_connections (
        id TEXT PRIMARY KEY REFERENCES resources(id) ON UPDATE CASCADE ON DELETE CASCADE,
        db_type TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER,
        database_name TEXT,
        username TEXT,
        password TEXT
    )",
    "CREATE TABLE IF NOT EXISTS resources_metadata_tables (
        id TEXT PRIMARY KEY REFERENCES resources(id) ON UPDATE CASCADE ON DELETE CASCADE,
        database_name TEXT NOT NULL,
        table_name TEXT NOT NULL,
        display_name TEXT,
        description TEXT,
        connection_id TEXT NOT NULL REFERENCES resources_database_connections(id)
    )",
    "CREATE TABLE IF NOT EXISTS resources_metadata_table_columns (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        table_id TEXT NOT NULL REFERENCES resources_metadata_tables(id),
        column_name TEXT NOT NULL,
        display_name TEXT,
        data_type TEXT NOT NULL,
        ordinal_position INTEGER NOT NULL,
        is_nullable TEXT,
        state TEXT NOT NULL DEFAULT 'A',
        column_default TEXT,
        description TEXT
    )",
    "CREATE TABLE IF NOT EXISTS workspaces (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        owner_id TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'A',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS workspace_resources (
        id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL REFERENCES workspaces(id),
        resource_id TEXT NOT NULL REFERENCES resources(id),
        state TEXT NOT NULL DEFAULT 'A',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS workspace_users (
        id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL REFERENCES workspaces(id),
        user_id TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'A',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

/// Opens the catalog store, creating the database file if needed.
///
/// # Errors
/// Returns a configuration error for a malformed URL and a storage error if
/// the pool cannot be created.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            CatalogError::configuration(format!("Invalid catalog store URL: {}", e))
        })?
        .create_if_missing(true)
        .foreign_keys(true);

    // An in-memory database lives and dies with its connection, so it must
    // be pinned to exactly one and never reaped.
    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| CatalogError::storage("Failed to open catalog store", e))?;

    tracing::info!("Catalog store opened at {}", database_url);
    Ok(pool)
}

/// Applies the catalog schema.
///
/// Safe to call on every startup; all statements are idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| CatalogError::storage("Failed to apply catalog schema", e))?;
    }
    tracing::debug!("Catalog schema applied ({} tables)", MIGRATIONS.len());
    Ok(())
}

/// Pre-compiled pattern for SQL identifier syntax.
#[allow(clippy::expect_used)] // pattern is a literal, cannot fail at runtime
fn identifier_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier pattern")
    })
}

/// Validates a database/table/column identifier at registration time.
///
/// The allow-list built from registered columns is the sole injection
/// defense for identifiers in dynamic SQL, so everything entering the
/// catalog must already be a well-formed identifier.
///
/// # Errors
/// Returns a validation error for empty, over-long or malformed identifiers.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CatalogError::validation(format!("{} cannot be empty", kind)));
    }
    if value.len() > 255 {
        return Err(CatalogError::validation(format!(
            "{} too long: maximum 255 characters",
            kind
        )));
    }
    if !identifier_pattern().is_match(value) {
        return Err(CatalogError::validation(format!(
            "{} '{}' is not a valid identifier (letters, digits and underscores only, must not start with a digit)",
            kind, value
        )));
    }
    Ok(())
}

pub(crate) fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| {
        CatalogError::configuration(format!("Corrupt {} value in catalog store", column))
    })
}

pub(crate) fn parse_state(raw: &str) -> Result<ResourceState> {
    ResourceState::parse(raw).ok_or_else(|| {
        CatalogError::configuration(format!("Corrupt state value '{}' in catalog store", raw))
    })
}

pub(crate) fn parse_resource_type(raw: &str) -> Result<ResourceType> {
    ResourceType::parse(raw).ok_or_else(|| {
        CatalogError::configuration(format!(
            "Corrupt resource type '{}' in catalog store",
            raw
        ))
    })
}

pub(crate) fn parse_db_type(raw: &str) -> Result<DatabaseType> {
    DatabaseType::parse(raw).ok_or_else(|| {
        CatalogError::configuration(format!("Corrupt db_type '{}' in catalog store", raw))
    })
}
