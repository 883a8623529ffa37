//! DMS RBAC Doctor
//!
//! Reports deduplicated role assignments per user and finds the integrity
//! faults that make a role list show the same grant twice.
//!
//! ## Commands
//!
//! - **report**: group assignments per user, check the lookup join, list
//!   orphaned assignments and role keys that are not unique
//! - **repair**: plan (and with `--apply`, delete) duplicate assignment rows
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DMS_RBAC_CONFIG` | - | Config file path |
//! | `DMS_RBAC_DATABASE_TYPE` | from URL | `sqlite`, `postgres` or `mysql` |
//! | `DMS_RBAC_DATABASE_URL` | - | Database connection URL (required) |
//! | `DMS_RBAC_REPORT_FORMAT` | `text` | `text` or `json` |
//! | `LOG_FORMAT` | `text` | `json` for structured logs on stderr |
//! | `RUST_LOG` | `info` | Log level |

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use dms_common::{DatabaseKind, OutputFormat};
use dms_config::{AppConfig, ConfigLoader, TablesConfig};
use dms_rbac::{
    AssignmentDiagnostics, AssignmentFilter, AssignmentTables, CleanupMode, DuplicateCleanup,
    MySqlRoleAssignmentRepository, PgRoleAssignmentRepository, RoleAssignmentRepository,
    SqliteRoleAssignmentRepository,
};

use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;

#[derive(Parser, Debug)]
#[command(name = "dms-rbac-doctor")]
#[command(about = "Role assignment diagnostics for the DMS RBAC tables")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(long, env = "DMS_RBAC_CONFIG")]
    config: Option<PathBuf>,

    /// Database type (sqlite, postgres, mysql)
    #[arg(long, value_parser = parse_database_kind)]
    db_type: Option<DatabaseKind>,

    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Output format (text, json)
    #[arg(long, value_parser = parse_output_format)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show deduplicated role assignments and integrity findings
    Report {
        /// Only this user
        #[arg(long)]
        user: Option<i64>,

        /// Skip inactive assignments
        #[arg(long)]
        active_only: bool,
    },

    /// Find duplicate assignment rows and optionally delete them
    Repair {
        /// Only this user
        #[arg(long)]
        user: Option<i64>,

        /// Delete the duplicates instead of only listing them
        #[arg(long)]
        apply: bool,
    },

    /// Print an example configuration file
    ExampleConfig,
}

fn parse_database_kind(value: &str) -> Result<DatabaseKind, String> {
    DatabaseKind::parse(value).ok_or_else(|| format!("unknown database type: {}", value))
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(value).ok_or_else(|| format!("unknown output format: {}", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    dms_common::logging::init_logging("dms-rbac-doctor");

    let args = Args::parse();

    if let Command::ExampleConfig = args.command {
        print!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("Failed to load configuration")?;

    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if config.database.url.trim().is_empty() {
        bail!("No database URL configured; set --database-url or DMS_RBAC_DATABASE_URL");
    }
    config.database.kind = args
        .db_type
        .or_else(|| DatabaseKind::from_url(&config.database.url))
        .unwrap_or(config.database.kind);
    let format = args.format.unwrap_or(config.report.format);

    info!(database = %config.database.kind, "Starting DMS RBAC doctor");

    let repo = create_repository(&config).await?;

    let output = match args.command {
        Command::Report { user, active_only } => {
            let mut filter = scope(user);
            if active_only || !config.report.include_inactive {
                filter = filter.active_only();
            }
            let report = AssignmentDiagnostics::run(repo.as_ref(), &filter).await?;
            match format {
                OutputFormat::Json => serde_json::to_string_pretty(&report)? + "\n",
                OutputFormat::Text => render::diagnostic_report(&report),
            }
        }
        Command::Repair { user, apply } => {
            let mode = if apply { CleanupMode::Apply } else { CleanupMode::DryRun };
            let outcome = DuplicateCleanup::run(repo.as_ref(), &scope(user), mode).await?;
            match format {
                OutputFormat::Json => serde_json::to_string_pretty(&outcome)? + "\n",
                OutputFormat::Text => render::cleanup_outcome(&outcome),
            }
        }
        Command::ExampleConfig => AppConfig::example_toml(),
    };

    print!("{}", output);
    Ok(())
}

fn scope(user: Option<i64>) -> AssignmentFilter {
    match user {
        Some(user_id) => AssignmentFilter::for_user(user_id),
        None => AssignmentFilter::all(),
    }
}

fn assignment_tables(tables: &TablesConfig) -> AssignmentTables {
    AssignmentTables {
        user_roles: tables.user_roles.clone(),
        roles: tables.roles.clone(),
        role_key_column: tables.role_key_column.clone(),
        role_display_column: tables.role_display_column.clone(),
    }
}

async fn create_repository(config: &AppConfig) -> Result<Box<dyn RoleAssignmentRepository>> {
    let db = &config.database;
    let tables = assignment_tables(&config.tables);
    let acquire_timeout = Duration::from_secs(db.acquire_timeout_secs);

    match db.kind {
        DatabaseKind::Sqlite => {
            info!("Using SQLite role assignment repository");
            let pool = SqlitePoolOptions::new()
                .max_connections(db.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(&db.url)
                .await
                .context("Failed to connect to SQLite")?;
            Ok(Box::new(SqliteRoleAssignmentRepository::new(pool, tables)?))
        }
        DatabaseKind::Postgres => {
            info!("Using PostgreSQL role assignment repository");
            let pool = PgPoolOptions::new()
                .max_connections(db.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(&db.url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            Ok(Box::new(PgRoleAssignmentRepository::new(pool, tables)?))
        }
        DatabaseKind::Mysql => {
            info!("Using MySQL role assignment repository");
            let pool = MySqlPoolOptions::new()
                .max_connections(db.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(&db.url)
                .await
                .context("Failed to connect to MySQL")?;
            Ok(Box::new(MySqlRoleAssignmentRepository::new(pool, tables)?))
        }
    }
}
