use async_trait::async_trait;
use std::sync::Mutex;

use crate::models::AuditEvent;

/// Destination for security-relevant events. Emission is best-effort
/// and must never fail a request.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent);
}

/// Sink that writes audit events to the structured log under the
/// `audit` target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            action = %event.action,
            actor_id = ?event.actor_id,
            event_target = ?event.target,
            ip = ?event.ip,
            detail = %event.detail,
            at = %event.at,
            "audit"
        );
    }
}

/// Sink that records events in memory, for assertions in tests.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
