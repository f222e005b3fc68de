//! Command-line administration tool for the metacat data catalog.
//!
//! Registers database connections and table metadata, manages workspaces,
//! and runs dynamic queries against registered tables. Connector passwords
//! are prompted interactively, never taken from argv, and are persisted
//! obfuscated under the server-held datasource key.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use metacat_core::{
    init_logging, store, ColumnSpec, ConnectionSpec, ConnectionStore, DatabaseType, MetadataStore,
    QueryParams, Settings, SortOrder, SqliteExecutor, TableDataService, TableSpec, WorkspaceSpec,
    WorkspaceStore,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "metacat")]
#[command(about = "Multi-tenant data catalog administration tool")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Catalog store URL
    #[arg(long, env = "METACAT_DATABASE_URL", help = "Catalog store URL")]
    pub database_url: Option<String>,

    /// Acting user id
    #[arg(
        long,
        env = "METACAT_USER",
        help = "UUID of the acting user, recorded as creator/owner"
    )]
    pub user: Option<Uuid>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize the catalog store schema
    Init,
    /// Manage database connections
    #[command(subcommand)]
    Conn(ConnCommand),
    /// Manage registered table metadata
    #[command(subcommand)]
    Table(TableCommand),
    /// Manage workspaces
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Query a registered table
    Query(QueryArgs),
}

#[derive(Subcommand)]
pub enum ConnCommand {
    /// Register a database connection (password prompted, never on argv)
    Add(ConnAddArgs),
    /// List registered connections
    List,
    /// Probe a stored connection, or an ad-hoc target described inline
    Test(ConnTestArgs),
    /// Remove a connection (subtype row removed, base resource soft-deleted)
    Remove {
        /// Connection id
        id: Uuid,
    },
}

#[derive(Args)]
pub struct ConnAddArgs {
    /// Display name for the connection
    #[arg(long)]
    pub name: String,

    /// Target engine: postgresql, mysql or mongodb
    #[arg(long)]
    pub db_type: String,

    /// Target host
    #[arg(long)]
    pub host: String,

    /// Target port (engine default when omitted)
    #[arg(long)]
    pub port: Option<u16>,

    /// Target database name
    #[arg(long)]
    pub database: Option<String>,

    /// Username for the target
    #[arg(long)]
    pub username: Option<String>,

    /// Prompt for a password
    #[arg(long, help = "Prompt for a password on stdin")]
    pub password: bool,
}

#[derive(Args)]
pub struct ConnTestArgs {
    /// Registered connection id (omit to describe the target inline)
    pub id: Option<Uuid>,

    /// Target engine for an ad-hoc probe
    #[arg(long, conflicts_with = "id")]
    pub db_type: Option<String>,

    /// Target host for an ad-hoc probe
    #[arg(long, conflicts_with = "id")]
    pub host: Option<String>,

    /// Target port (engine default when omitted)
    #[arg(long, conflicts_with = "id")]
    pub port: Option<u16>,

    /// Target database name
    #[arg(long, conflicts_with = "id")]
    pub database: Option<String>,

    /// Username for the target
    #[arg(long, conflicts_with = "id")]
    pub username: Option<String>,

    /// Prompt for a password
    #[arg(long, conflicts_with = "id", help = "Prompt for a password on stdin")]
    pub password: bool,
}

#[derive(Subcommand)]
pub enum TableCommand {
    /// Register table metadata, optionally introspecting live columns
    Register(TableRegisterArgs),
    /// List registered tables with their columns
    List,
    /// Show one registered table by its table name
    Show {
        /// Registered table name
        table: String,
    },
}

#[derive(Args)]
pub struct TableRegisterArgs {
    /// Display name for the metadata resource
    #[arg(long)]
    pub name: String,

    /// Connection to reach the table through
    #[arg(long)]
    pub connection: Uuid,

    /// Database (schema) holding the table
    #[arg(long)]
    pub database: String,

    /// Table name on the target store
    #[arg(long)]
    pub table: String,

    /// Pull column descriptors from the live store
    #[arg(long, help = "Introspect columns from the live target store")]
    pub introspect: bool,
}

#[derive(Subcommand)]
pub enum WorkspaceCommand {
    /// Create a workspace owned by the acting user
    Create {
        /// Workspace name (unique)
        name: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// List workspaces the acting user has joined
    List,
    /// Enroll a user into a workspace
    AddUser {
        /// Workspace id
        workspace: Uuid,
        /// User id to enroll
        user: Uuid,
    },
    /// Attach a resource to a workspace
    Attach {
        /// Workspace id
        workspace: Uuid,
        /// Resource id to attach
        resource: Uuid,
    },
}

#[derive(Args)]
pub struct QueryArgs {
    /// Registered table name
    pub table: String,

    /// Equality filters, column=value
    #[arg(long = "filter", value_name = "COL=VALUE")]
    pub filters: Vec<String>,

    /// Sort column
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Page number (1-based)
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Rows per page
    #[arg(long, default_value = "20")]
    pub page_size: u32,

    /// Columns to project, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet)?;

    let mut settings = Settings::from_env()?;
    if let Some(url) = &cli.global.database_url {
        settings.database_url.clone_from(url);
    }
    let user = cli.global.user.unwrap_or_else(Uuid::nil);

    let pool = store::connect(&settings.database_url).await?;
    store::migrate(&pool).await?;

    match cli.command {
        Command::Init => {
            info!("Catalog store initialized");
            println!("Catalog store ready at {}", settings.database_url);
            Ok(())
        }
        Command::Conn(command) => {
            let connections = ConnectionStore::new(pool, settings.datasource_key.clone());
            run_conn(command, &connections, &settings, user).await
        }
        Command::Table(command) => {
            let connections = ConnectionStore::new(pool.clone(), settings.datasource_key.clone());
            let metadata = MetadataStore::new(pool);
            run_table(command, &connections, &metadata, &settings, user).await
        }
        Command::Workspace(command) => {
            let workspaces = WorkspaceStore::new(pool);
            run_workspace(command, &workspaces, user).await
        }
        Command::Query(args) => {
            let metadata = MetadataStore::new(pool.clone());
            let service = TableDataService::new(metadata, Arc::new(SqliteExecutor::new(pool)));
            run_query(args, &service).await
        }
    }
}

async fn run_conn(
    command: ConnCommand,
    connections: &ConnectionStore,
    settings: &Settings,
    user: Uuid,
) -> anyhow::Result<()> {
    match command {
        ConnCommand::Add(args) => {
            let Some(db_type) = DatabaseType::parse(&args.db_type) else {
                bail!(
                    "unsupported engine '{}': expected postgresql, mysql or mongodb",
                    args.db_type
                );
            };
            let password = if args.password {
                let value = rpassword::prompt_password("Password: ")
                    .context("Failed to read password")?;
                if value.is_empty() { None } else { Some(value) }
            } else {
                None
            };
            if password.is_some() && settings.datasource_key.is_none() {
                warn!("No datasource key configured; the password will not be persisted");
            }

            let created = connections
                .create(
                    &ConnectionSpec {
                        name: args.name,
                        db_type,
                        host: args.host,
                        port: args.port,
                        database: args.database,
                        username: args.username,
                        password,
                    },
                    user,
                    None,
                )
                .await?;
            println!("Registered connection {} ({})", created.name, created.id);
            Ok(())
        }
        ConnCommand::List => {
            for conn in connections.list(0, 500).await? {
                println!(
                    "{}  {}  {}  {}:{}  [{}]",
                    conn.id,
                    conn.name,
                    conn.db_type,
                    conn.host,
                    conn.port.unwrap_or_else(|| conn.db_type.default_port()),
                    conn.state
                );
            }
            Ok(())
        }
        ConnCommand::Test(args) => {
            let result = if let Some(id) = args.id {
                match connections.test_connection(id, settings.probe_timeout).await? {
                    None => bail!("connection {} is not registered", id),
                    Some(result) => result,
                }
            } else {
                let (Some(raw_type), Some(host)) = (&args.db_type, args.host.clone()) else {
                    bail!("pass a connection id, or --db-type and --host for an ad-hoc probe");
                };
                let Some(db_type) = DatabaseType::parse(raw_type) else {
                    bail!(
                        "unsupported engine '{}': expected postgresql, mysql or mongodb",
                        raw_type
                    );
                };
                let password = if args.password {
                    let value = rpassword::prompt_password("Password: ")
                        .context("Failed to read password")?;
                    if value.is_empty() { None } else { Some(value) }
                } else {
                    None
                };
                connections
                    .test_spec(
                        &ConnectionSpec {
                            name: "ad-hoc".into(),
                            db_type,
                            host,
                            port: args.port,
                            database: args.database,
                            username: args.username,
                            password,
                        },
                        settings.probe_timeout,
                    )
                    .await
            };

            if result.success {
                println!("Connection test successful");
                Ok(())
            } else {
                bail!(
                    "connection test failed: {}",
                    result.error.unwrap_or_else(|| "unknown".to_string())
                )
            }
        }
        ConnCommand::Remove { id } => {
            if connections.delete_full(id).await? {
                println!("Removed connection {}", id);
                Ok(())
            } else {
                bail!("connection {} is not registered", id)
            }
        }
    }
}

async fn run_table(
    command: TableCommand,
    connections: &ConnectionStore,
    metadata: &MetadataStore,
    settings: &Settings,
    user: Uuid,
) -> anyhow::Result<()> {
    match command {
        TableCommand::Register(args) => {
            let created = metadata
                .create_table(
                    &TableSpec {
                        name: args.name,
                        database_name: args.database.clone(),
                        table_name: args.table.clone(),
                        display_name: None,
                        description: None,
                        connection_id: args.connection,
                    },
                    user,
                    None,
                )
                .await?;
            println!("Registered table {} ({})", created.table_name, created.id);

            if args.introspect {
                let columns: Option<Vec<ColumnSpec>> = connections
                    .introspect_columns(
                        args.connection,
                        &args.database,
                        &args.table,
                        settings.probe_timeout,
                    )
                    .await?;
                match columns {
                    Some(columns) => {
                        let count = columns.len();
                        for column in &columns {
                            metadata.create_column(created.id, column).await?;
                        }
                        println!("Introspected {} columns", count);
                    }
                    None => {
                        println!("Introspection unavailable; add columns manually");
                    }
                }
            }
            Ok(())
        }
        TableCommand::List => {
            for entry in metadata.list_tables(0, 500).await? {
                println!(
                    "{}  {}  {}.{}  {} columns  [{}]",
                    entry.table.id,
                    entry.table.name,
                    entry.table.database_name,
                    entry.table.table_name,
                    entry.columns.len(),
                    entry.table.state
                );
            }
            Ok(())
        }
        TableCommand::Show { table } => {
            let Some(entry) = metadata.get_table_by_name(&table).await? else {
                bail!("table '{}' is not registered", table);
            };
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(())
        }
    }
}

async fn run_workspace(
    command: WorkspaceCommand,
    workspaces: &WorkspaceStore,
    user: Uuid,
) -> anyhow::Result<()> {
    match command {
        WorkspaceCommand::Create { name, description } => {
            let created = workspaces
                .create(&WorkspaceSpec { name, description }, user)
                .await?;
            println!("Created workspace {} ({})", created.name, created.id);
            Ok(())
        }
        WorkspaceCommand::List => {
            for workspace in workspaces.list_joined(user).await? {
                let marker = if workspace.owner_id == user { "owner" } else { "member" };
                println!("{}  {}  [{}]", workspace.id, workspace.name, marker);
            }
            Ok(())
        }
        WorkspaceCommand::AddUser { workspace, user } => {
            workspaces.add_user(workspace, user).await?;
            println!("Enrolled {} into {}", user, workspace);
            Ok(())
        }
        WorkspaceCommand::Attach { workspace, resource } => {
            workspaces.attach_resource(workspace, resource).await?;
            println!("Attached {} to {}", resource, workspace);
            Ok(())
        }
    }
}

async fn run_query(args: QueryArgs, service: &TableDataService) -> anyhow::Result<()> {
    let mut filters = BTreeMap::new();
    for raw in &args.filters {
        let Some((column, value)) = raw.split_once('=') else {
            bail!("invalid filter '{}': expected column=value", raw);
        };
        // Bare numbers and booleans filter as their typed form
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        filters.insert(column.to_string(), value);
    }

    let params = QueryParams {
        filters: if filters.is_empty() { None } else { Some(filters) },
        sort_by: args.sort_by,
        sort_order: if args.desc { SortOrder::Desc } else { SortOrder::Asc },
        page: args.page,
        page_size: args.page_size,
        select_fields: if args.fields.is_empty() {
            None
        } else {
            Some(args.fields)
        },
    };

    let response = service.query_table_data(&args.table, &params).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
