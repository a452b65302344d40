use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A security-relevant event emitted by the identity flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub target: Option<String>,
    pub ip: Option<String>,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            actor_id: None,
            target: None,
            ip: None,
            detail: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
