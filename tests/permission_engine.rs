use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use tempfile::{tempdir, TempDir};

use practice_authz::authz::{EventBusAuditSink, PermissionEngine};
use practice_authz::config::EngineConfig;
use practice_authz::events::{init_event_bus, start_activity_listener, verify_chain};
use practice_authz::models::permission::{ModuleAction, RbacAction};
use practice_authz::store::SqliteAuthzStore;

async fn setup_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

async fn insert_employee(pool: &SqlitePool, id: &str, role: &str, module_access: &str) -> Result<()> {
    sqlx::query("INSERT INTO employees (id, name, email, role, module_access) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(format!("Employee {}", id))
        .bind(format!("{}@practice.test", id))
        .bind(role)
        .bind(module_access)
        .execute(pool)
        .await?;
    Ok(())
}

async fn grant(pool: &SqlitePool, role: &str, keys: &[&str]) -> Result<()> {
    for key in keys {
        sqlx::query("INSERT INTO role_permissions (role, permission_key) VALUES (?, ?)")
            .bind(role)
            .bind(key)
            .execute(pool)
            .await?;
    }
    Ok(())
}

fn engine_for(pool: &SqlitePool) -> (PermissionEngine, Arc<SqliteAuthzStore>) {
    let store = Arc::new(SqliteAuthzStore::new(pool.clone()));
    (PermissionEngine::new(store.clone(), EngineConfig::default()), store)
}

#[tokio::test]
async fn staff_scenario_against_sqlite() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    grant(&pool, "staff", &["tasks.read", "tasks.create"]).await?;
    insert_employee(&pool, "emp-staff", "Staff", "[]").await?;

    let (engine, _) = engine_for(&pool);

    assert!(!engine.can_perform_action("emp-staff", "tasks", ModuleAction::Edit).await);
    assert!(engine.can_perform_action("emp-staff", "tasks", ModuleAction::Create).await);
    assert!(engine.has_permission("staff", "tasks", RbacAction::Write).await);
    assert!(!engine.has_permission("staff", "tasks", RbacAction::Admin).await);

    let matrix = engine.get_user_permission_matrix("emp-staff").await;
    assert_eq!(matrix.role, "staff");
    assert!(!matrix.is_unrestricted);
    assert!(matrix.modules["tasks"].can_view);

    Ok(())
}

#[tokio::test]
async fn manager_without_client_groups_is_denied_everything_there() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    grant(&pool, "manager", &["clients.manage", "client_groups.manage"]).await?;
    insert_employee(&pool, "emp-manager", "manager", r#"["clients"]"#).await?;

    let (engine, _) = engine_for(&pool);

    assert!(!engine.can_access_module("emp-manager", "client_groups").await);
    assert!(!engine.can_access_module("emp-manager", "Client Groups").await);
    for action in [ModuleAction::Read, ModuleAction::Create, ModuleAction::Edit, ModuleAction::Delete] {
        assert!(!engine.can_perform_action("emp-manager", "client_groups", action).await);
        assert!(engine.can_perform_action("emp-manager", "clients", action).await);
    }

    Ok(())
}

#[tokio::test]
async fn legacy_comma_separated_module_access_is_understood() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    grant(&pool, "staff", &["cases.read", "hearings.read"]).await?;
    insert_employee(&pool, "emp-legacy", "staff", "Cases, Client Groups").await?;

    let (engine, _) = engine_for(&pool);

    assert!(engine.can_perform_action("emp-legacy", "cases", ModuleAction::Read).await);
    assert!(engine.can_access_module("emp-legacy", "client_groups").await);
    assert!(!engine.can_perform_action("emp-legacy", "hearings", ModuleAction::Read).await);
    assert_eq!(engine.accessible_modules("emp-legacy").await, vec!["cases".to_string()]);

    Ok(())
}

#[tokio::test]
async fn undecodable_profile_fails_closed() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    grant(&pool, "staff", &["tasks.read"]).await?;
    insert_employee(&pool, "emp-broken", "staff", "[not json").await?;

    let (engine, _) = engine_for(&pool);

    let matrix = engine.get_user_permission_matrix("emp-broken").await;
    assert_eq!(matrix.role, "unknown");
    assert!(matrix.modules.is_empty());
    assert!(!engine.can_perform_action("emp-broken", "tasks", ModuleAction::Read).await);
    assert!(!engine.can_access_module("emp-broken", "tasks").await);

    Ok(())
}

#[tokio::test]
async fn replacing_role_keys_takes_effect_after_invalidation() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    grant(&pool, "staff", &["tasks.read"]).await?;
    insert_employee(&pool, "emp-staff", "staff", "[]").await?;

    let (engine, store) = engine_for(&pool);
    assert!(!engine.can_perform_action("emp-staff", "tasks", ModuleAction::Delete).await);

    let previous = store
        .replace_role_permissions("STAFF", &["tasks.read".to_string(), "tasks.delete".to_string()], Utc::now())
        .await?;
    assert_eq!(previous, vec!["tasks.read".to_string()]);

    // still the cached answer
    assert!(!engine.can_perform_action("emp-staff", "tasks", ModuleAction::Delete).await);

    engine.clear_role_cache("staff");
    assert!(engine.can_perform_action("emp-staff", "tasks", ModuleAction::Delete).await);

    let missing = store
        .replace_module_access("nobody", &["tasks".to_string()], Utc::now())
        .await?;
    assert!(missing.is_none());

    Ok(())
}

#[tokio::test]
async fn denials_reach_the_hash_chained_audit_log() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    grant(&pool, "staff", &["tasks.read"]).await?;
    insert_employee(&pool, "emp-staff", "staff", r#"["tasks"]"#).await?;

    let (bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let store = Arc::new(SqliteAuthzStore::new(pool.clone()));
    let engine = PermissionEngine::new(store, EngineConfig::default())
        .with_audit_sink(Arc::new(EventBusAuditSink::new(bus)));

    assert!(!engine.can_perform_action("emp-staff", "tasks", ModuleAction::Delete).await);
    assert!(!engine.can_access_module("emp-staff", "cases").await);
    assert!(engine.can_perform_action("emp-staff", "tasks", ModuleAction::Read).await);

    let mut count = 0i64;
    for _ in 0..50 {
        count = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&pool)
            .await?;
        if count >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(count, 2, "grants are not audited by default");

    let rows = sqlx::query("SELECT event_name, user_id, module, action, reason, allowed, prev_hash FROM audit_log ORDER BY seq")
        .fetch_all(&pool)
        .await?;

    assert_eq!(rows[0].get::<String, _>("event_name"), "permission.denied");
    assert_eq!(rows[0].get::<String, _>("user_id"), "emp-staff");
    assert_eq!(rows[0].get::<String, _>("module"), "tasks");
    assert_eq!(rows[0].get::<String, _>("action"), "delete");
    assert_eq!(rows[0].get::<String, _>("reason"), "no delete permission");
    assert_eq!(rows[0].get::<i64, _>("allowed"), 0);
    assert!(rows[0].get::<Option<String>, _>("prev_hash").is_none());

    assert_eq!(rows[1].get::<String, _>("reason"), "module access denied");
    assert!(rows[1].get::<Option<String>, _>("prev_hash").is_some());

    assert_eq!(verify_chain(&pool).await?, None);

    sqlx::query("UPDATE audit_log SET payload = '{}' WHERE seq = 1")
        .execute(&pool)
        .await?;
    assert_eq!(verify_chain(&pool).await?, Some(1));

    Ok(())
}
