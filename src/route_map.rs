//! URL path to module key table.
//!
//! Owned by the HTTP layer; the permission engine itself never sees paths.
//! The table is configuration: a JSON object of `{ "<path prefix>": "<module key>" }`
//! read from the file named by `ROUTE_MODULE_MAP`, or the built-in default.

use std::collections::BTreeMap;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct RouteModuleMap {
    /// Longest prefix first.
    entries: Vec<(String, String)>,
}

impl RouteModuleMap {
    pub fn new<I, P, M>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, M)>,
        P: AsRef<str>,
        M: Into<String>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(prefix, module)| (normalize_path(prefix.as_ref()), module.into()))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        entries.dedup_by(|a, b| a.0 == b.0);
        Self { entries }
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let de = &mut serde_json::Deserializer::from_str(raw);
        let table: BTreeMap<String, String> = serde_path_to_error::deserialize(de)
            .map_err(|e| AppError::configuration(format!("invalid route map at {}: {}", e.path(), e.inner())))?;

        if let Some((prefix, _)) = table.iter().find(|(prefix, _)| !prefix.starts_with('/')) {
            return Err(AppError::configuration(format!("route prefix '{}' must start with '/'", prefix)));
        }

        Ok(Self::new(table))
    }

    pub fn from_env() -> Result<Self, AppError> {
        match std::env::var("ROUTE_MODULE_MAP") {
            Ok(path) if !path.trim().is_empty() => {
                let raw = std::fs::read_to_string(path.trim())
                    .map_err(|e| AppError::configuration(format!("cannot read ROUTE_MODULE_MAP {}: {}", path, e)))?;
                Self::from_json(&raw)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Module key for `path`, matching whole path segments only.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        let path = normalize_path(path);
        self.entries
            .iter()
            .find(|(prefix, _)| {
                path == *prefix
                    || (prefix != "/" && path.starts_with(prefix.as_str()) && path[prefix.len()..].starts_with('/'))
            })
            .map(|(_, module)| module.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RouteModuleMap {
    fn default() -> Self {
        Self::new([
            ("/", "dashboard"),
            ("/dashboard", "dashboard"),
            ("/cases", "cases"),
            ("/clients", "clients"),
            ("/client-groups", "client_groups"),
            ("/hearings", "hearings"),
            ("/documents", "documents"),
            ("/tasks", "tasks"),
            ("/calendar", "calendar"),
            ("/notifications", "notifications"),
            ("/templates", "templates"),
            ("/employees", "employees"),
            ("/reports", "reports"),
            ("/compliance", "compliance"),
            ("/settings", "settings"),
        ])
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("").trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_lowercase()
    } else {
        format!("/{}", trimmed.to_lowercase())
    }
}
