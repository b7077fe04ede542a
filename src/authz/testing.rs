use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use super::audit::AuditSink;
use crate::errors::{AppError, AppResult};
use crate::models::audit::AuditEntry;
use crate::models::rbac::{EmployeeProfile, RolePermissionRow};
use crate::store::{normalize_role, AuthzStore};

/// In-memory `AuthzStore` with fetch counters and failure switches.
#[derive(Default)]
pub struct MemoryStore {
    roles: Mutex<HashMap<String, Vec<String>>>,
    employees: Mutex<HashMap<String, EmployeeProfile>>,
    role_fetches: AtomicUsize,
    profile_fetches: AtomicUsize,
    fail_roles: AtomicBool,
    fail_profiles: AtomicBool,
    fetch_yields: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(self, role: &str, keys: &[&str]) -> Self {
        self.set_role(role, keys);
        self
    }

    pub fn with_employee(self, id: &str, role: &str, module_access: &[&str]) -> Self {
        self.set_employee(id, role, module_access);
        self
    }

    /// Make every fetch yield to the scheduler a few times before answering.
    pub fn with_fetch_yields(mut self, yields: usize) -> Self {
        self.fetch_yields = yields;
        self
    }

    pub fn set_role(&self, role: &str, keys: &[&str]) {
        let keys = keys.iter().map(|k| k.to_string()).collect();
        self.roles.lock().unwrap().insert(normalize_role(role), keys);
    }

    pub fn set_employee(&self, id: &str, role: &str, module_access: &[&str]) {
        let profile = EmployeeProfile {
            id: id.to_string(),
            name: id.to_string(),
            role: role.to_string(),
            module_access: module_access.iter().map(|m| m.to_string()).collect(),
            updated_at: Utc::now(),
        };
        self.employees.lock().unwrap().insert(id.to_string(), profile);
    }

    pub fn fail_roles(&self, fail: bool) {
        self.fail_roles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profiles(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn role_fetches(&self) -> usize {
        self.role_fetches.load(Ordering::SeqCst)
    }

    pub fn profile_fetches(&self) -> usize {
        self.profile_fetches.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        for _ in 0..self.fetch_yields {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl AuthzStore for MemoryStore {
    async fn role_permissions(&self, role: &str) -> AppResult<Vec<RolePermissionRow>> {
        self.role_fetches.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("role table offline"));
        }

        let role = normalize_role(role);
        let keys = self.roles.lock().unwrap().get(&role).cloned().unwrap_or_default();
        Ok(keys
            .into_iter()
            .map(|permission_key| RolePermissionRow { role: role.clone(), permission_key })
            .collect())
    }

    async fn employee_profile(&self, user_id: &str) -> AppResult<Option<EmployeeProfile>> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_profiles.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("employee table offline"));
        }

        Ok(self.employees.lock().unwrap().get(user_id).cloned())
    }
}

/// Audit sink that keeps every entry for inspection.
#[derive(Default, Clone)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingSink {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}
