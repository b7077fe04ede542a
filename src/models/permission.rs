use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// =============================================================================
// ACTION VOCABULARIES
// =============================================================================

/// Action vocabulary stored in `role_permissions.permission_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DbAction {
    Read,
    Create,
    Update,
    Delete,
    Manage,
    Customize,
    /// Anything not in the known vocabulary, kept verbatim.
    Other(String),
}

impl DbAction {
    pub fn as_str(&self) -> &str {
        match self {
            DbAction::Read => "read",
            DbAction::Create => "create",
            DbAction::Update => "update",
            DbAction::Delete => "delete",
            DbAction::Manage => "manage",
            DbAction::Customize => "customize",
            DbAction::Other(raw) => raw.as_str(),
        }
    }
}

impl From<&str> for DbAction {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "read" => DbAction::Read,
            "create" => DbAction::Create,
            "update" => DbAction::Update,
            "delete" => DbAction::Delete,
            "manage" => DbAction::Manage,
            "customize" => DbAction::Customize,
            other => DbAction::Other(other.to_string()),
        }
    }
}

impl From<String> for DbAction {
    fn from(value: String) -> Self {
        DbAction::from(value.as_str())
    }
}

impl From<DbAction> for String {
    fn from(value: DbAction) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DbAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse RBAC vocabulary the db actions collapse into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RbacAction {
    Read,
    Write,
    Delete,
    Admin,
}

impl RbacAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RbacAction::Read => "read",
            RbacAction::Write => "write",
            RbacAction::Delete => "delete",
            RbacAction::Admin => "admin",
        }
    }
}

impl fmt::Display for RbacAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RbacAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "read" => Ok(RbacAction::Read),
            "write" => Ok(RbacAction::Write),
            "delete" => Ok(RbacAction::Delete),
            "admin" => Ok(RbacAction::Admin),
            other => Err(format!("unknown rbac action '{other}'")),
        }
    }
}

/// Action vocabulary used by UI callers (buttons, forms, route guards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModuleAction {
    Read,
    Create,
    Edit,
    Delete,
}

impl ModuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleAction::Read => "read",
            ModuleAction::Create => "create",
            ModuleAction::Edit => "edit",
            ModuleAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModuleAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "read" | "view" => Ok(ModuleAction::Read),
            "create" => Ok(ModuleAction::Create),
            "edit" | "update" => Ok(ModuleAction::Edit),
            "delete" => Ok(ModuleAction::Delete),
            other => Err(format!("unknown module action '{other}'")),
        }
    }
}

// =============================================================================
// PARSED PERMISSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParsedPermission {
    pub module: String,
    #[schema(value_type = String, example = "create")]
    pub action: DbAction,
    pub rbac_action: RbacAction,
}

// =============================================================================
// MATRIX
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ModulePermissions {
    pub can_view: bool,
    pub can_create: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl ModulePermissions {
    pub fn all() -> Self {
        Self {
            can_view: true,
            can_create: true,
            can_edit: true,
            can_delete: true,
        }
    }

    pub fn allows(&self, action: ModuleAction) -> bool {
        match action {
            ModuleAction::Read => self.can_view,
            ModuleAction::Create => self.can_create,
            ModuleAction::Edit => self.can_edit,
            ModuleAction::Delete => self.can_delete,
        }
    }
}

/// Role name used for matrices built after a failed lookup.
pub const UNKNOWN_ROLE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserPermissionMatrix {
    pub role: String,
    pub modules: BTreeMap<String, ModulePermissions>,
    pub module_access: Vec<String>,
    pub is_unrestricted: bool,
    /// Set only by `empty()`; stored data can never produce it.
    #[serde(skip)]
    fail_closed: bool,
}

impl UserPermissionMatrix {
    pub fn new(
        role: String,
        modules: BTreeMap<String, ModulePermissions>,
        module_access: Vec<String>,
        is_unrestricted: bool,
    ) -> Self {
        Self {
            role,
            modules,
            module_access,
            is_unrestricted,
            fail_closed: false,
        }
    }

    /// The fail-closed matrix: no modules, no access, nothing allowed.
    pub fn empty() -> Self {
        Self {
            role: UNKNOWN_ROLE.to_string(),
            modules: BTreeMap::new(),
            module_access: Vec::new(),
            is_unrestricted: false,
            fail_closed: true,
        }
    }

    /// True only for the matrix produced by a failed lookup.
    pub fn is_fail_closed(&self) -> bool {
        self.fail_closed
    }

    pub fn module(&self, module_key: &str) -> Option<&ModulePermissions> {
        self.modules.get(module_key)
    }
}

// =============================================================================
// DECISIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionStatus {
    pub allowed: bool,
    #[schema(example = "module access denied")]
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionCheckQuery {
    #[param(example = "tasks")]
    pub module: String,
    /// read, create, edit or delete (view and update are accepted aliases)
    #[param(example = "edit")]
    pub action: String,
}

impl PermissionCheckQuery {
    pub fn action(&self) -> Result<ModuleAction, String> {
        self.action.parse()
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RouteCheckQuery {
    #[param(example = "/cases/42")]
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessibleModules {
    pub user_id: String,
    pub modules: Vec<String>,
}

/// Read decision for a URL path, after route-to-module resolution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteAccess {
    #[schema(example = "/cases/42")]
    pub path: String,
    #[schema(example = "cases")]
    pub module: Option<String>,
    pub allowed: bool,
    #[schema(example = "allowed")]
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}
