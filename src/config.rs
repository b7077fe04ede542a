use std::collections::BTreeSet;

use chrono::Duration;

use crate::authz::cache::DEFAULT_TTL_SECS;
use crate::authz::roles;
use crate::errors::AppError;

/// Roles that bypass both visibility and action checks unless overridden.
pub const DEFAULT_UNRESTRICTED_ROLES: [&str; 2] = [roles::ADMIN, roles::PARTNER];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_ttl: Duration,
    /// Normalised (trimmed, lower-cased) role names.
    pub unrestricted_roles: BTreeSet<String>,
    /// Also send allowed decisions to the audit sink.
    pub audit_grants: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::seconds(DEFAULT_TTL_SECS),
            unrestricted_roles: DEFAULT_UNRESTRICTED_ROLES.iter().map(|r| r.to_string()).collect(),
            audit_grants: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("PERMISSION_CACHE_TTL_SECS") {
            let secs = raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs >= 0)
                .ok_or_else(|| AppError::configuration("PERMISSION_CACHE_TTL_SECS must be a non-negative integer"))?;
            config.cache_ttl = Duration::seconds(secs);
        }

        if let Ok(raw) = std::env::var("UNRESTRICTED_ROLES") {
            config.unrestricted_roles = parse_role_list(&raw);
        }

        if let Ok(raw) = std::env::var("AUDIT_GRANTS") {
            config.audit_grants = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(AppError::configuration("AUDIT_GRANTS must be a boolean")),
            };
        }

        Ok(config)
    }

    pub fn with_unrestricted_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.unrestricted_roles = roles
            .into_iter()
            .map(|r| r.as_ref().trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_audit_grants(mut self, audit_grants: bool) -> Self {
        self.audit_grants = audit_grants;
        self
    }
}

fn parse_role_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl, Duration::minutes(5));
        assert!(config.unrestricted_roles.contains("admin"));
        assert!(config.unrestricted_roles.contains("partner"));
        assert!(!config.audit_grants);
    }

    #[test]
    fn role_list_is_normalised() {
        let roles = parse_role_list(" Admin, PARTNER ,, owner");
        assert_eq!(
            roles.into_iter().collect::<Vec<_>>(),
            vec!["admin".to_string(), "owner".to_string(), "partner".to_string()]
        );
    }
}
