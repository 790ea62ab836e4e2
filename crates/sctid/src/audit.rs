use crate::{IdentifierStatus, SctId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emitted once per persisted status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub id: SctId,
    /// `None` when the record was created by the change.
    pub old_status: Option<IdentifierStatus>,
    pub new_status: IdentifierStatus,
    pub requestor_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget receiver of [`TransitionEvent`]s.
///
/// Events are delivered after the change is durable; a sink cannot veto or
/// roll back a transition, so implementations swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &TransitionEvent);
}

/// Writes each event as a structured `tracing` event on the `sctid::audit`
/// target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &TransitionEvent) {
        tracing::info!(
            target: "sctid::audit",
            id = %event.id,
            old_status = event.old_status.map_or("NONE", IdentifierStatus::as_str),
            new_status = %event.new_status,
            requestor_id = %event.requestor_id,
            timestamp = %event.timestamp.to_rfc3339(),
            "status transition"
        );
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &TransitionEvent) {}
}
