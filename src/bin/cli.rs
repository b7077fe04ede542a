use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use practice_authz::authz::{PermissionEngine, TracingAuditSink};
use practice_authz::config::EngineConfig;
use practice_authz::events::verify_chain;
use practice_authz::jwt::JwtConfig;
use practice_authz::models::permission::ModuleAction;
use practice_authz::store::SqliteAuthzStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "practice-authz admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Evaluate one permission check and print the decision
    Check {
        user_id: String,
        module: String,
        /// read, create, edit or delete
        action: String,
    },
    /// Print a user's permission matrix
    Matrix { user_id: String },
    /// Sign a bearer token for an employee id
    IssueToken { user_id: String },
    /// Recompute the audit log hash chain
    AuditVerify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When running in Docker the binary CWD may differ, so fall back to the
    // crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::Check { user_id, module, action } => {
            let action: ModuleAction = action.parse().map_err(anyhow::Error::msg)?;
            let engine = engine().await?;
            let status = engine.get_permission_status(&user_id, &module, action).await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Matrix { user_id } => {
            let engine = engine().await?;
            let matrix = engine.get_user_permission_matrix(&user_id).await;
            println!("{}", serde_json::to_string_pretty(&matrix)?);
        }
        Commands::IssueToken { user_id } => {
            let jwt = JwtConfig::from_env()?;
            println!("{}", jwt.encode(&user_id)?);
        }
        Commands::AuditVerify => {
            let pool = get_pool().await?;
            match verify_chain(&pool).await? {
                None => println!("audit chain intact"),
                Some(seq) => anyhow::bail!("audit chain broken at seq {}", seq),
            }
        }
    }

    Ok(())
}

async fn engine() -> anyhow::Result<PermissionEngine> {
    let pool = get_pool().await?;
    let config = EngineConfig::from_env()?;
    Ok(PermissionEngine::new(Arc::new(SqliteAuthzStore::new(pool)), config)
        .with_audit_sink(Arc::new(TracingAuditSink)))
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let status = if applied_versions.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when running from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
