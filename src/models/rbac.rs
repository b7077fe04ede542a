use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::events::{Loggable, Severity};
use crate::models::permission::ParsedPermission;

// =============================================================================
// ROLE-PERMISSION ROWS
// =============================================================================

/// Raw `role_permissions` row as handed over by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionRow {
    pub role: String,
    pub permission_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolePermissions {
    #[schema(example = "staff")]
    pub role: String,
    #[schema(example = json!(["tasks.read", "tasks.create"]))]
    pub permission_keys: Vec<String>,
    pub parsed: Vec<ParsedPermission>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceRolePermissionsRequest {
    #[schema(example = json!(["tasks.read", "tasks.create", "documents.manage"]))]
    pub permission_keys: Vec<String>,
}

/// Logged whenever a role's permission set is replaced.
#[derive(Debug, Clone, Serialize)]
pub struct RolePermissionChange {
    pub role: String,
    pub previous: Vec<String>,
    pub current: Vec<String>,
}

impl Loggable for RolePermissionChange {
    fn entity_type() -> &'static str { "role_permissions" }
    fn subject_id(&self) -> String { self.role.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}

// =============================================================================
// EMPLOYEE PROFILE
// =============================================================================

/// The slice of an employee record the permission engine consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmployeeProfile {
    pub id: String,
    pub name: String,
    #[schema(example = "manager")]
    pub role: String,
    #[schema(example = json!(["cases", "Clients"]))]
    pub module_access: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateModuleAccessRequest {
    #[schema(example = json!(["cases", "clients", "tasks"]))]
    pub module_access: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleAccessChange {
    pub user_id: String,
    pub previous: Vec<String>,
    pub current: Vec<String>,
}

impl Loggable for ModuleAccessChange {
    fn entity_type() -> &'static str { "module_access" }
    fn subject_id(&self) -> String { self.user_id.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}
