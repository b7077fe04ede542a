//! Decision audit sinks.
//!
//! Recording is fire-and-forget: a sink must return immediately and must not
//! fail the permission check that produced the entry.

use chrono::{DateTime, Utc};

use crate::events::{log_activity_with_context, EventBus};
use crate::models::audit::AuditEntry;
use crate::models::permission::ModuleAction;

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);

    fn log_denial(&self, user_id: &str, module: &str, action: ModuleAction, reason: &str, at: DateTime<Utc>) {
        self.record(AuditEntry {
            user_id: user_id.to_string(),
            module: module.to_string(),
            action,
            reason: reason.to_string(),
            allowed: false,
            timestamp: at,
        });
    }

    fn log_grant(&self, user_id: &str, module: &str, action: ModuleAction, at: DateTime<Utc>) {
        self.record(AuditEntry {
            user_id: user_id.to_string(),
            module: module.to_string(),
            action,
            reason: "allowed".to_string(),
            allowed: true,
            timestamp: at,
        });
    }
}

/// Publishes entries on the event bus; the activity listener persists them.
#[derive(Debug, Clone)]
pub struct EventBusAuditSink {
    bus: EventBus,
}

impl EventBusAuditSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl AuditSink for EventBusAuditSink {
    fn record(&self, entry: AuditEntry) {
        let action = if entry.allowed { "granted" } else { "denied" };
        let at = entry.timestamp;
        if !log_activity_with_context(&self.bus, action, None, &entry, at, None) {
            tracing::warn!(
                user_id = %entry.user_id,
                module = %entry.module,
                action = %entry.action,
                "audit entry not delivered"
            );
        }
    }
}

/// Writes entries to the tracing output only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            user_id = %entry.user_id,
            module = %entry.module,
            action = %entry.action,
            allowed = entry.allowed,
            reason = %entry.reason,
            "permission decision"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::init_event_bus;

    #[tokio::test]
    async fn denial_is_published_as_permission_denied() {
        let (bus, mut rx) = init_event_bus();
        let sink = EventBusAuditSink::new(bus);

        sink.log_denial("u-7", "cases", ModuleAction::Delete, "no delete permission", Utc::now());

        let event = rx.recv().await.unwrap();
        assert_eq!(event["name"], "permission.denied");
        assert_eq!(event["subject_id"], "u-7");
        assert_eq!(event["payload"]["new"]["module"], "cases");
        assert_eq!(event["payload"]["new"]["action"], "delete");
        assert_eq!(event["payload"]["new"]["reason"], "no delete permission");
        assert_eq!(event["payload"]["new"]["allowed"], false);
    }

    #[test]
    fn missing_listener_is_swallowed() {
        let (bus, rx) = init_event_bus();
        drop(rx);
        let sink = EventBusAuditSink::new(bus);
        sink.log_grant("u-7", "cases", ModuleAction::Read, Utc::now());
    }
}
