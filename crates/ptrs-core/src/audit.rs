use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::tenancy::TenantId;
use crate::types::RunId;

/// Who changed what, recorded after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    pub actor_id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub run_id: RunId,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Fire-and-forget audit log. A sink must not fail the operation that
/// produced the event.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes events to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            tenant = %event.tenant_id,
            actor = %event.actor_id,
            action = %event.action,
            entity = %event.entity,
            entity_id = %event.entity_id,
            run = %event.run_id,
            detail = %event.detail,
            "audit"
        );
    }
}
