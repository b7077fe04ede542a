use serde::{Deserialize, Serialize};

/// Severity levels for audit records.
/// Controls retention policies and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical events: long-term retention, never auto-delete
    Critical,
    /// Important events: medium-term retention (default)
    #[default]
    Important,
    /// Noise events: aggressively trimmed (e.g., 7 days)
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that can be written to the audit log.
pub trait Loggable: Serialize + Send + Sync {
    /// The entity type name (e.g., "permission", "role_permissions").
    /// This becomes the prefix in event names like "permission.denied"
    fn entity_type() -> &'static str;

    /// Identifier of the thing the event is about (user id, role name)
    fn subject_id(&self) -> String;

    /// Severity level for logs (defaults to Important)
    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Override severity based on action (e.g., "replaced" -> Critical)
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "replaced" | "revoked" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
