//! Permission administration routes
//!
//! Role permission sets and employee module access. Every change is logged
//! to the activity log with Critical severity and invalidates the caches it
//! affects before the response is sent.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;

use super::require_permission_admin;
use crate::app::AppState;
use crate::authz::codec;
use crate::errors::AppError;
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::*;
use crate::store::{normalize_role, AuthzStore};

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/roles/:role/permissions",
            get(get_role_permissions).put(replace_role_permissions),
        )
        .route("/employees/:user_id/module-access", put(replace_module_access))
}

/// Keys must be `<module>.<action>` with both parts present.
fn validate_keys(keys: &[String]) -> Result<Vec<String>, AppError> {
    let mut cleaned: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.trim();
        let parsed = codec::parse(key);
        if parsed.module.is_empty() || parsed.action.as_str().is_empty() {
            return Err(AppError::bad_request(format!(
                "invalid permission key '{}': expected <module>.<action>",
                key
            )));
        }
        let canonical = codec::format_key(&parsed.module.to_lowercase(), &parsed.action);
        if !cleaned.contains(&canonical) {
            cleaned.push(canonical);
        }
    }
    cleaned.sort();
    Ok(cleaned)
}

fn role_permissions_view(role: String, keys: Vec<String>) -> RolePermissions {
    let parsed = keys.iter().map(|k| codec::parse(k)).collect();
    RolePermissions {
        role,
        permission_keys: keys,
        parsed,
    }
}

// =============================================================================
// ROLE PERMISSIONS
// =============================================================================

/// Permission keys held by a role
#[utoipa::path(
    get,
    path = "/rbac/roles/{role}/permissions",
    tag = "RBAC",
    params(("role" = String, Path, description = "Role name, case-insensitive")),
    responses(
        (status = 200, description = "Stored keys and their parsed form", body = RolePermissions),
        (status = 403, description = "Caller may not administer permissions"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role): Path<String>,
) -> Result<Json<RolePermissions>, AppError> {
    require_permission_admin(&state, &auth).await?;

    let role = normalize_role(&role);
    let keys = state
        .store
        .role_permissions(&role)
        .await?
        .into_iter()
        .map(|row| row.permission_key)
        .collect();

    Ok(Json(role_permissions_view(role, keys)))
}

/// Replace the full permission set of a role
#[utoipa::path(
    put,
    path = "/rbac/roles/{role}/permissions",
    tag = "RBAC",
    params(("role" = String, Path, description = "Role name, case-insensitive")),
    request_body = ReplaceRolePermissionsRequest,
    responses(
        (status = 200, description = "Permission set replaced", body = RolePermissions),
        (status = 400, description = "Malformed permission key"),
        (status = 403, description = "Caller may not administer permissions"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn replace_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role): Path<String>,
    Json(req): Json<ReplaceRolePermissionsRequest>,
) -> Result<Json<RolePermissions>, AppError> {
    require_permission_admin(&state, &auth).await?;

    let role = normalize_role(&role);
    if role.is_empty() {
        return Err(AppError::bad_request("role must not be empty"));
    }
    let keys = validate_keys(&req.permission_keys)?;
    let now = Utc::now();

    let previous = state.store.replace_role_permissions(&role, &keys, now).await?;
    state.engine.clear_role_cache(&role);

    let change = RolePermissionChange {
        role: role.clone(),
        previous,
        current: keys.clone(),
    };

    log_activity_with_context(
        &state.event_bus,
        "replaced",
        Some(auth.user_id),
        &change,
        now,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role_permissions_view(role, keys)))
}

// =============================================================================
// EMPLOYEE MODULE ACCESS
// =============================================================================

/// Replace the modules an employee may see
#[utoipa::path(
    put,
    path = "/rbac/employees/{user_id}/module-access",
    tag = "RBAC",
    params(("user_id" = String, Path, description = "Employee ID")),
    request_body = UpdateModuleAccessRequest,
    responses(
        (status = 200, description = "Module access replaced", body = EmployeeProfile),
        (status = 400, description = "Unknown module name"),
        (status = 403, description = "Caller may not administer permissions"),
        (status = 404, description = "Employee not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn replace_module_access(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateModuleAccessRequest>,
) -> Result<Json<EmployeeProfile>, AppError> {
    require_permission_admin(&state, &auth).await?;

    let catalog = state.engine.catalog();
    let unknown: Vec<&str> = req
        .module_access
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty() && !catalog.contains(m))
        .collect();
    if !unknown.is_empty() {
        return Err(AppError::bad_request(format!("unknown modules: {}", unknown.join(", "))));
    }

    let module_access = catalog.canonical_list(&req.module_access);
    let now = Utc::now();

    let previous = state
        .store
        .replace_module_access(&user_id, &module_access, now)
        .await?
        .ok_or_else(|| AppError::not_found("Employee not found"))?;
    state.engine.clear_user_cache(&user_id);

    let profile = state
        .store
        .employee_profile(&user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Employee not found"))?;

    let change = ModuleAccessChange {
        user_id: user_id.clone(),
        previous,
        current: module_access,
    };

    log_activity_with_context(
        &state.event_bus,
        "replaced",
        Some(auth.user_id),
        &change,
        now,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_trimmed_lowercased_and_deduplicated() {
        let keys = validate_keys(&[
            " Tasks.Read ".to_string(),
            "tasks.read".to_string(),
            "documents.manage".to_string(),
        ])
        .unwrap();
        assert_eq!(keys, vec!["documents.manage".to_string(), "tasks.read".to_string()]);
    }

    #[test]
    fn keys_without_module_or_action_are_rejected() {
        assert!(validate_keys(&["tasks".to_string()]).is_err());
        assert!(validate_keys(&[".read".to_string()]).is_err());
        assert!(validate_keys(&["tasks.".to_string()]).is_err());
    }
}
