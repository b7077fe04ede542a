use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::events::{Loggable, Severity};
use crate::models::permission::ModuleAction;

/// One permission decision, as written to the audit log.
///
/// The field set is consumed by external reporting; keep it stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub user_id: String,
    pub module: String,
    pub action: ModuleAction,
    pub reason: String,
    pub allowed: bool,
    pub timestamp: DateTime<Utc>,
}

impl Loggable for AuditEntry {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> String { self.user_id.clone() }

    fn severity(&self) -> Severity {
        if self.allowed {
            Severity::Noise
        } else {
            Severity::Important
        }
    }
}
