//! Backing-store boundary for the permission engine.
//!
//! Everything returned from here has already been decoded and normalised;
//! the engine never looks at raw rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::row_parsers;
use crate::errors::AppResult;
use crate::models::rbac::{EmployeeProfile, RolePermissionRow};

#[async_trait]
pub trait AuthzStore: Send + Sync {
    /// Permission rows for one normalised role name.
    async fn role_permissions(&self, role: &str) -> AppResult<Vec<RolePermissionRow>>;

    /// The employee record behind `user_id`, `None` if there is none.
    async fn employee_profile(&self, user_id: &str) -> AppResult<Option<EmployeeProfile>>;
}

/// Lower-cased, trimmed role name used as cache key and store filter.
pub fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct SqliteAuthzStore {
    pool: SqlitePool,
}

impl SqliteAuthzStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the full key set of a role. Returns the previous keys.
    pub async fn replace_role_permissions(
        &self,
        role: &str,
        keys: &[String],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<String>> {
        let role = normalize_role(role);
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query(
            "SELECT role, permission_key FROM role_permissions WHERE lower(trim(role)) = ? ORDER BY permission_key",
        )
        .bind(&role)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(row_parsers::role_permission_from_row)
        .map(|row| row.map(|r| r.permission_key))
        .collect::<AppResult<Vec<_>>>()?;

        sqlx::query("DELETE FROM role_permissions WHERE lower(trim(role)) = ?")
            .bind(&role)
            .execute(&mut *tx)
            .await?;

        for key in keys {
            sqlx::query(
                "INSERT OR IGNORE INTO role_permissions (role, permission_key, created_at) VALUES (?, ?, ?)",
            )
            .bind(&role)
            .bind(key.trim())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(previous)
    }

    /// Replace an employee's module access list. Returns the previous list,
    /// or `None` when the employee does not exist.
    pub async fn replace_module_access(
        &self,
        user_id: &str,
        module_access: &[String],
        now: DateTime<Utc>,
    ) -> AppResult<Option<Vec<String>>> {
        let Some(existing) = self.employee_profile(user_id).await? else {
            return Ok(None);
        };

        let encoded = serde_json::to_string(module_access)?;
        sqlx::query("UPDATE employees SET module_access = ?, updated_at = ? WHERE id = ?")
            .bind(encoded)
            .bind(now.to_rfc3339())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(Some(existing.module_access))
    }
}

#[async_trait]
impl AuthzStore for SqliteAuthzStore {
    async fn role_permissions(&self, role: &str) -> AppResult<Vec<RolePermissionRow>> {
        let rows = sqlx::query(
            "SELECT role, permission_key FROM role_permissions WHERE lower(trim(role)) = ? ORDER BY permission_key",
        )
        .bind(normalize_role(role))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_parsers::role_permission_from_row).collect()
    }

    async fn employee_profile(&self, user_id: &str) -> AppResult<Option<EmployeeProfile>> {
        let row = sqlx::query(
            "SELECT id, name, role, module_access, updated_at FROM employees WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::employee_profile_from_row).transpose()
    }
}
