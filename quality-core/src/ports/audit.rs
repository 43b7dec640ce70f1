// quality-core/src/ports/audit.rs

// Execution log sink. One event per rule per record.
// Writes are fire-and-forget: the validation path never waits on, nor fails because of, the sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Passed,
    Violated,
    Exempted,
    Inapplicable,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub batch_id: String,
    pub rule_id: String,
    pub record_id: String,
    pub outcome: AuditOutcome,
    pub duration_micros: u64,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Sanitized subset of the rule context (identifiers and a few key fields only).
    pub context: serde_json::Value,
}

#[derive(Error, Debug)]
#[error("Audit sink error: {0}")]
pub struct AuditError(pub String);

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_execution(&self, event: &AuditEvent) -> Result<(), AuditError>;
}
