//! Best-effort audit event sink.
//!
//! The contract is one-way: `record` never fails and never slows the caller
//! down enough to matter. Whatever backs the sink (log pipeline, table,
//! message bus) must swallow its own errors.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::domain::ClientInfo;

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: &'static str,
    pub user_id: Option<Uuid>,
    pub entity_type: Option<&'static str>,
    pub entity_id: Option<String>,
    pub meta: Option<Value>,
    pub client: ClientInfo,
}

impl AuditEvent {
    pub fn new(action: &'static str, client: ClientInfo) -> Self {
        AuditEvent {
            action,
            user_id: None,
            entity_type: None,
            entity_id: None,
            meta: None,
            client,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn entity(mut self, entity_type: &'static str, entity_id: String) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id);
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Emits audit events as structured log lines under the `audit` target.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = event.action,
            user_id = ?event.user_id,
            entity_type = ?event.entity_type,
            entity_id = ?event.entity_id,
            ip = ?event.client.ip,
            user_agent = ?event.client.user_agent,
            meta = ?event.meta,
            "audit event"
        );
    }
}
