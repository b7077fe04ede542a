pub mod health;
pub mod permissions;
pub mod rbac;

use crate::app::AppState;
use crate::authz::ADMINISTRATION_MODULE;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::permission::{ModuleAction, RbacAction};

/// Permission administration needs an unrestricted role, or `admin` on the
/// administration module together with visibility of it.
pub(crate) async fn require_permission_admin(state: &AppState, auth: &AuthUser) -> AppResult<()> {
    let engine = &state.engine;
    let matrix = engine.get_user_permission_matrix(&auth.user_id).await;

    if matrix.is_unrestricted {
        return Ok(());
    }

    let visible = engine
        .evaluate(&matrix, ADMINISTRATION_MODULE, ModuleAction::Read)
        .is_allowed();

    if visible && engine.has_permission(&matrix.role, ADMINISTRATION_MODULE, RbacAction::Admin).await {
        return Ok(());
    }

    tracing::debug!(user_id = %auth.user_id, role = %matrix.role, "permission administration refused");
    Err(AppError::forbidden("permission administration requires admin on settings"))
}
