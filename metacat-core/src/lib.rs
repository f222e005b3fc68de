//! Core library for metacat, a multi-tenant data catalog.
//!
//! The catalog registers resources (database connections, table metadata),
//! groups them into workspaces, and serves dynamic filter/sort/paginate
//! queries against registered tables. Generated SQL only ever contains
//! identifiers that were validated at registration time; caller-supplied
//! values are always bound as parameters.
//!
//! # Security Guarantees
//! - Connector passwords are stored obfuscated under a server-held key and
//!   never appear in any read model, log line or error message
//! - Registered column names are the sole allow-list for dynamic SQL
//! - Live probes and introspection are time-bounded and read-only
//!
//! # Architecture
//! - `store`: the catalog's own persistence, shared-key inheritance over SQLite
//! - `connectors`: feature-gated live drivers for probe and introspection
//! - `query`: pure planner plus an executor seam for the data path

pub mod config;
pub mod connectors;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;
pub mod security;
pub mod store;

// Re-export commonly used types
pub use config::Settings;
pub use error::{CatalogError, Result};
pub use logging::init_logging;
pub use models::{
    ColumnRecord, ColumnSpec, ColumnUpdate, ConnectionRecord, ConnectionSpec,
    ConnectionTestResult, ConnectionUpdate, DatabaseType, QueryParams, ResourceRecord,
    ResourceState, ResourceType, ResourceUpdate, SortOrder, TableDataResponse, TableRecord,
    TableSpec, TableUpdate, TableWithColumns, WorkspaceRecord, WorkspaceResourceRecord,
    WorkspaceSpec, WorkspaceUpdate, WorkspaceUserRecord,
};
pub use query::{Dialect, QueryExecutor, QueryPlan, SqliteExecutor, TableDataService};
pub use store::{ConnectionStore, MetadataStore, ResourceFilter, ResourceStore, WorkspaceStore};
