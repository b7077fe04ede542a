//! The permission engine.
//!
//! Answers "can user U do action A in module M" by combining the employee's
//! module visibility with the role's action matrix. Module visibility is a
//! hard gate: a module the user cannot see denies every action in it, no
//! matter what the role grants.
//!
//! No operation here returns an error. Every lookup failure degrades to a
//! deny so render paths never have to handle exceptions.

use std::collections::HashSet;
use std::sync::Arc;

use super::audit::{AuditSink, NoopAuditSink};
use super::cache::{RolePermissionCache, TtlCache};
use super::clock::{Clock, SystemClock};
use super::codec;
use super::matrix::PermissionMatrixBuilder;
use super::visibility::{ModuleCatalog, ModuleVisibilityResolver};
use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};
use crate::models::permission::{
    DbAction, ModuleAction, PermissionStatus, RbacAction, UserPermissionMatrix,
};
use crate::store::{normalize_role, AuthzStore};

pub const REASON_ALLOWED: &str = "allowed";
pub const REASON_MODULE_DENIED: &str = "module access denied";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Unrestricted,
    Allowed,
    ModuleAccessDenied,
    NoActionPermission(ModuleAction),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Unrestricted | Decision::Allowed)
    }

    pub fn reason(self) -> String {
        match self {
            Decision::Unrestricted | Decision::Allowed => REASON_ALLOWED.to_string(),
            Decision::ModuleAccessDenied => REASON_MODULE_DENIED.to_string(),
            Decision::NoActionPermission(action) => format!("no {} permission", action),
        }
    }
}

pub struct PermissionEngine {
    store: Arc<dyn AuthzStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    role_cache: RolePermissionCache,
    matrix_cache: TtlCache<String, UserPermissionMatrix>,
    visibility: ModuleVisibilityResolver,
    builder: PermissionMatrixBuilder,
}

impl PermissionEngine {
    pub fn new(store: Arc<dyn AuthzStore>, config: EngineConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let catalog = ModuleCatalog::default();
        Self {
            role_cache: RolePermissionCache::new(Arc::clone(&store), config.cache_ttl, Arc::clone(&clock)),
            matrix_cache: TtlCache::new(config.cache_ttl, Arc::clone(&clock)),
            visibility: ModuleVisibilityResolver::new(catalog.clone()),
            builder: PermissionMatrixBuilder::new(catalog),
            audit: Arc::new(NoopAuditSink),
            store,
            config,
            clock,
        }
    }

    /// Replace the time source. Resets both caches.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.role_cache = RolePermissionCache::new(Arc::clone(&self.store), self.config.cache_ttl, Arc::clone(&clock));
        self.matrix_cache = TtlCache::new(self.config.cache_ttl, Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.visibility = ModuleVisibilityResolver::new(catalog.clone());
        self.builder = PermissionMatrixBuilder::new(catalog);
        self.matrix_cache.invalidate_all();
        self
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        self.visibility.catalog()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_unrestricted_role(&self, role: &str) -> bool {
        self.config.unrestricted_roles.contains(&normalize_role(role))
    }

    // =========================================================================
    // MATRIX
    // =========================================================================

    /// The user's permission snapshot; the empty matrix when anything fails.
    pub async fn get_user_permission_matrix(&self, user_id: &str) -> UserPermissionMatrix {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return UserPermissionMatrix::empty();
        }

        let resolved = self
            .matrix_cache
            .get_or_try_insert_with(user_id.to_string(), || self.resolve_matrix(user_id))
            .await;

        match resolved {
            Ok(matrix) => matrix,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "permission matrix unavailable; failing closed");
                UserPermissionMatrix::empty()
            }
        }
    }

    async fn resolve_matrix(&self, user_id: &str) -> AppResult<UserPermissionMatrix> {
        let profile = self
            .store
            .employee_profile(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no employee profile for {user_id}")))?;

        let role = normalize_role(&profile.role);
        let module_access = self.catalog().canonical_list(&profile.module_access);

        if self.is_unrestricted_role(&role) {
            tracing::debug!(user_id = %user_id, role = %role, "unrestricted role");
            return Ok(UserPermissionMatrix::new(
                role,
                self.builder.unrestricted(),
                module_access,
                true,
            ));
        }

        let parsed = self.role_cache.try_get_for_role(&role).await?;
        let modules = self.builder.build(&parsed);
        tracing::debug!(user_id = %user_id, role = %role, modules = modules.len(), "built permission matrix");

        Ok(UserPermissionMatrix::new(role, modules, module_access, false))
    }

    // =========================================================================
    // DECISIONS
    // =========================================================================

    /// Decide against an already resolved matrix. Visibility is checked
    /// before the action matrix.
    pub fn evaluate(&self, matrix: &UserPermissionMatrix, module: &str, action: ModuleAction) -> Decision {
        if matrix.is_unrestricted {
            return Decision::Unrestricted;
        }

        if !self.module_visible(matrix, module) {
            return Decision::ModuleAccessDenied;
        }

        let key = self.catalog().canonical(module);
        match matrix.module(&key) {
            Some(perms) if perms.allows(action) => Decision::Allowed,
            _ => Decision::NoActionPermission(action),
        }
    }

    /// Visibility for a restricted matrix. The fail-closed matrix sees
    /// nothing, even though its access list is empty.
    fn module_visible(&self, matrix: &UserPermissionMatrix, module: &str) -> bool {
        !matrix.is_fail_closed() && self.visibility.is_module_visible(&matrix.module_access, module)
    }

    pub async fn can_access_module(&self, user_id: &str, module: &str) -> bool {
        let matrix = self.get_user_permission_matrix(user_id).await;
        let visible = matrix.is_unrestricted || self.module_visible(&matrix, module);

        if visible {
            if self.config.audit_grants {
                self.audit.log_grant(user_id, module, ModuleAction::Read, self.clock.now());
            }
        } else {
            tracing::debug!(user_id = %user_id, module = %module, "module access denied");
            self.audit
                .log_denial(user_id, module, ModuleAction::Read, REASON_MODULE_DENIED, self.clock.now());
        }

        visible
    }

    pub async fn can_perform_action(&self, user_id: &str, module: &str, action: ModuleAction) -> bool {
        self.decide(user_id, module, action).await.is_allowed()
    }

    /// Decision plus user-facing reason and tooltip.
    pub async fn get_permission_status(&self, user_id: &str, module: &str, action: ModuleAction) -> PermissionStatus {
        let decision = self.decide(user_id, module, action).await;
        let display = self.catalog().display_name(module);

        let tooltip = match decision {
            Decision::Unrestricted | Decision::Allowed => None,
            Decision::ModuleAccessDenied => Some(format!(
                "You do not have access to the {} module. Contact your administrator to request access.",
                display
            )),
            Decision::NoActionPermission(action) => Some(format!(
                "You do not have permission to {} in {}.",
                action, display
            )),
        };

        PermissionStatus {
            allowed: decision.is_allowed(),
            reason: decision.reason(),
            tooltip,
        }
    }

    async fn decide(&self, user_id: &str, module: &str, action: ModuleAction) -> Decision {
        let matrix = self.get_user_permission_matrix(user_id).await;
        let decision = self.evaluate(&matrix, module, action);

        tracing::debug!(
            user_id = %user_id,
            module = %module,
            action = %action,
            decision = ?decision,
            "permission check"
        );

        if !decision.is_allowed() {
            self.audit.log_denial(user_id, module, action, &decision.reason(), self.clock.now());
        } else if self.config.audit_grants {
            self.audit.log_grant(user_id, module, action, self.clock.now());
        }

        decision
    }

    /// Role-level RBAC query against the stored keys.
    ///
    /// write needs create, update or customize; admin needs manage or the
    /// full create/update/delete/read set.
    pub async fn has_permission(&self, role: &str, module: &str, rbac: RbacAction) -> bool {
        if self.is_unrestricted_role(role) {
            return true;
        }

        let wanted = self.catalog().canonical(module);
        let held: HashSet<DbAction> = self
            .role_cache
            .get_for_role(role)
            .await
            .into_iter()
            .filter(|p| self.catalog().canonical(&p.module) == wanted)
            .map(|p| p.action)
            .collect();

        codec::satisfies(&held, rbac)
    }

    /// Modules the user can both see and read, for navigation.
    pub async fn accessible_modules(&self, user_id: &str) -> Vec<String> {
        let matrix = self.get_user_permission_matrix(user_id).await;
        if matrix.is_unrestricted {
            return self.catalog().keys().map(String::from).collect();
        }

        let mut modules: Vec<String> = matrix
            .modules
            .iter()
            .filter(|(key, perms)| perms.can_view && self.visibility.is_module_visible(&matrix.module_access, key))
            .map(|(key, _)| key.clone())
            .collect();
        modules.sort();
        modules
    }

    // =========================================================================
    // INVALIDATION
    // =========================================================================

    pub fn clear_user_cache(&self, user_id: &str) {
        tracing::info!(user_id = %user_id, "clearing user permission cache");
        self.matrix_cache.invalidate(&user_id.trim().to_string());
    }

    /// A role edit affects every user holding it; user matrices are not
    /// indexed by role, so all of them are dropped.
    pub fn clear_role_cache(&self, role: &str) {
        tracing::info!(role = %role, "clearing role permission cache");
        self.role_cache.invalidate(role);
        self.matrix_cache.invalidate_all();
    }

    pub fn clear_all_caches(&self) {
        tracing::info!("clearing all permission caches");
        self.role_cache.invalidate_all();
        self.matrix_cache.invalidate_all();
    }
}
