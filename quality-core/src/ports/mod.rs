// quality-core/src/ports/mod.rs

pub mod audit;
pub mod rule_store;

pub use audit::{AuditError, AuditEvent, AuditOutcome, AuditSink};
pub use rule_store::{RuleStore, RuleStoreError};
