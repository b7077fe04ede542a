//! Permission query endpoints.
//!
//! Every handler answers from the engine, which never errors; a user with no
//! employee record simply gets denials. Only malformed input and missing
//! authentication produce error responses.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use super::require_permission_admin;
use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::AuthUser;
use crate::models::permission::{
    AccessibleModules, ModuleAction, PermissionCheckQuery, PermissionStatus, RouteAccess, RouteCheckQuery,
    UserPermissionMatrix,
};

pub const REASON_UNMAPPED_ROUTE: &str = "unmapped route";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/matrix", get(my_matrix))
        .route("/me/check", get(my_check))
        .route("/me/modules", get(my_modules))
        .route("/me/route", get(my_route))
        .route("/users/:user_id/matrix", get(user_matrix))
        .route("/users/:user_id/check", get(user_check))
        .route("/cache/clear", post(clear_caches))
}

fn parse_check(query: &PermissionCheckQuery) -> Result<ModuleAction, AppError> {
    if query.module.trim().is_empty() {
        return Err(AppError::bad_request("module must not be empty"));
    }
    query.action().map_err(AppError::bad_request)
}

// =============================================================================
// CALLER
// =============================================================================

/// Permission matrix of the authenticated user
#[utoipa::path(
    get,
    path = "/permissions/me/matrix",
    tag = "Permissions",
    responses(
        (status = 200, description = "Caller's permission matrix", body = UserPermissionMatrix),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_matrix(State(state): State<AppState>, auth: AuthUser) -> Json<UserPermissionMatrix> {
    Json(state.engine.get_user_permission_matrix(&auth.user_id).await)
}

/// Check one action in one module for the authenticated user
#[utoipa::path(
    get,
    path = "/permissions/me/check",
    tag = "Permissions",
    params(PermissionCheckQuery),
    responses(
        (status = 200, description = "Decision with reason and tooltip", body = PermissionStatus),
        (status = 400, description = "Unknown action or empty module"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_check(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PermissionCheckQuery>,
) -> Result<Json<PermissionStatus>, AppError> {
    let action = parse_check(&query)?;
    let status = state
        .engine
        .get_permission_status(&auth.user_id, query.module.trim(), action)
        .await;
    Ok(Json(status))
}

/// Modules the authenticated user can see and read
#[utoipa::path(
    get,
    path = "/permissions/me/modules",
    tag = "Permissions",
    responses((status = 200, description = "Navigation modules", body = AccessibleModules)),
    security(("bearerAuth" = []))
)]
pub async fn my_modules(State(state): State<AppState>, auth: AuthUser) -> Json<AccessibleModules> {
    let modules = state.engine.accessible_modules(&auth.user_id).await;
    Json(AccessibleModules {
        user_id: auth.user_id,
        modules,
    })
}

/// Route guard: may the authenticated user open this path
#[utoipa::path(
    get,
    path = "/permissions/me/route",
    tag = "Permissions",
    params(RouteCheckQuery),
    responses((status = 200, description = "Read decision for the module behind the path", body = RouteAccess)),
    security(("bearerAuth" = []))
)]
pub async fn my_route(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RouteCheckQuery>,
) -> Json<RouteAccess> {
    let Some(module) = state.route_map.resolve(&query.path).map(String::from) else {
        tracing::debug!(user_id = %auth.user_id, path = %query.path, "unmapped route");
        return Json(RouteAccess {
            path: query.path,
            module: None,
            allowed: false,
            reason: REASON_UNMAPPED_ROUTE.to_string(),
            tooltip: None,
        });
    };

    let status = state
        .engine
        .get_permission_status(&auth.user_id, &module, ModuleAction::Read)
        .await;

    Json(RouteAccess {
        path: query.path,
        module: Some(module),
        allowed: status.allowed,
        reason: status.reason,
        tooltip: status.tooltip,
    })
}

// =============================================================================
// OTHER USERS (ADMIN)
// =============================================================================

/// Permission matrix of another user
#[utoipa::path(
    get,
    path = "/permissions/users/{user_id}/matrix",
    tag = "Permissions",
    params(("user_id" = String, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "User's permission matrix", body = UserPermissionMatrix),
        (status = 403, description = "Caller may not administer permissions"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn user_matrix(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserPermissionMatrix>, AppError> {
    require_permission_admin(&state, &auth).await?;
    Ok(Json(state.engine.get_user_permission_matrix(&user_id).await))
}

/// Check one action in one module for another user
#[utoipa::path(
    get,
    path = "/permissions/users/{user_id}/check",
    tag = "Permissions",
    params(("user_id" = String, Path, description = "Employee ID"), PermissionCheckQuery),
    responses(
        (status = 200, description = "Decision with reason and tooltip", body = PermissionStatus),
        (status = 403, description = "Caller may not administer permissions"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn user_check(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    Query(query): Query<PermissionCheckQuery>,
) -> Result<Json<PermissionStatus>, AppError> {
    require_permission_admin(&state, &auth).await?;
    let action = parse_check(&query)?;
    let status = state
        .engine
        .get_permission_status(&user_id, query.module.trim(), action)
        .await;
    Ok(Json(status))
}

/// Drop every cached role set and user matrix
#[utoipa::path(
    post,
    path = "/permissions/cache/clear",
    tag = "Permissions",
    responses(
        (status = 204, description = "Caches cleared"),
        (status = 403, description = "Caller may not administer permissions"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn clear_caches(State(state): State<AppState>, auth: AuthUser) -> Result<StatusCode, AppError> {
    require_permission_admin(&state, &auth).await?;
    state.engine.clear_all_caches();
    tracing::info!(actor_id = %auth.user_id, "permission caches cleared on request");
    Ok(StatusCode::NO_CONTENT)
}
