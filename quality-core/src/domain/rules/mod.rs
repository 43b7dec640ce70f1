// quality-core/src/domain/rules/mod.rs

pub mod model;
pub mod violation;

pub use model::{
    BusinessRule, Exemption, ParameterKind, QualityDimension, RuleParameter, Severity,
};
pub use violation::{ExecutionOutcome, ExemptionReason, RuleFailure, RuleViolation};
