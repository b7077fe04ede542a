use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::AppResult;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(
        name: impl Into<String>,
        actor_id: Option<String>,
        subject_id: Option<String>,
        occurred_at: DateTime<Utc>,
        payload: T,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at,
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context for activity logging (IP, User-Agent, etc.)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Extract context from Axum request headers
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Structured activity payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// The current/new state of the entity
    #[serde(rename = "new")]
    pub current: Value,
    /// Request context (IP, User-Agent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    /// Severity level for retention policy
    pub severity: Severity,
}

/// Publish an activity for any entity implementing `Loggable`.
///
/// Returns `false` when the event could not be handed to the bus (no
/// listener, serialization failure). Callers treat that as a diagnostic only.
pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<String>,
    entity: &T,
    occurred_at: DateTime<Utc>,
    context: Option<RequestContext>,
) -> bool {
    let event_name = format!("{}.{}", T::entity_type(), action);

    let current = match serde_json::to_value(entity) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(event = %event_name, error = %err, "failed to serialize activity");
            return false;
        }
    };

    let payload = ActivityPayload {
        current,
        context,
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent::new(
        event_name,
        actor_id,
        Some(entity.subject_id()),
        occurred_at,
        payload,
    );

    let value = match serde_json::to_value(&event) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(event = %event.name, error = %err, "failed to serialize event");
            return false;
        }
    };

    // Fire and forget - logging failures must not break the caller
    match event_bus.send(value) {
        Ok(_) => true,
        Err(_) => {
            tracing::warn!(event = %event.name, "no activity listener attached; event dropped");
            false
        }
    }
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("Activity listener started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(e) = persist_event(&pool, &event).await {
                    tracing::error!("Failed to save audit record: {}", e);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("Activity listener stopped");
}

/// Append one bus event to `audit_log`, chaining its hash onto the last row.
pub async fn persist_event(pool: &SqlitePool, event: &Value) -> AppResult<()> {
    let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let actor_id = event.get("actor_id").and_then(|v| v.as_str());
    let subject_id = event.get("subject_id").and_then(|v| v.as_str());
    let occurred_at = event
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let payload = event.get("payload");
    let severity = payload
        .and_then(|p| p.get("severity"))
        .and_then(|s| s.as_str())
        .unwrap_or("important");

    // Permission decisions carry their fields in the payload's "new" object
    let current = payload.and_then(|p| p.get("new"));
    let field = |key: &str| current.and_then(|c| c.get(key)).and_then(|v| v.as_str()).map(String::from);
    let allowed = current.and_then(|c| c.get("allowed")).and_then(|v| v.as_bool());
    let user_id = field("user_id").or_else(|| subject_id.map(String::from));

    let payload_str = serde_json::to_string(event)?;

    let mut tx = pool.begin().await?;

    let last = sqlx::query("SELECT seq, hash FROM audit_log ORDER BY seq DESC LIMIT 1")
        .fetch_optional(&mut *tx)
        .await?;
    let (seq, prev_hash) = match last {
        Some(row) => (row.try_get::<i64, _>("seq")? + 1, Some(row.try_get::<String, _>("hash")?)),
        None => (1, None),
    };

    let hash = chain_hash(prev_hash.as_deref(), &payload_str);

    sqlx::query(
        r#"
        INSERT INTO audit_log (id, seq, event_name, actor_id, user_id, module, action, reason, allowed, occurred_at, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(seq)
    .bind(name)
    .bind(actor_id)
    .bind(user_id)
    .bind(field("module"))
    .bind(field("action"))
    .bind(field("reason"))
    .bind(allowed)
    .bind(occurred_at.to_rfc3339())
    .bind(&payload_str)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// SHA256(prev_hash || payload), hex encoded.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(ph) = prev_hash {
        hasher.update(ph.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Walk the audit log in order and recompute every hash.
///
/// Returns the sequence number of the first broken link, if any.
pub async fn verify_chain(pool: &SqlitePool) -> AppResult<Option<i64>> {
    let rows = sqlx::query("SELECT seq, payload, prev_hash, hash FROM audit_log ORDER BY seq ASC")
        .fetch_all(pool)
        .await?;

    let mut expected_prev: Option<String> = None;
    for row in rows {
        let seq: i64 = row.try_get("seq")?;
        let payload: String = row.try_get("payload")?;
        let prev_hash: Option<String> = row.try_get("prev_hash")?;
        let hash: String = row.try_get("hash")?;

        if prev_hash != expected_prev || chain_hash(prev_hash.as_deref(), &payload) != hash {
            return Ok(Some(seq));
        }
        expected_prev = Some(hash);
    }

    Ok(None)
}
