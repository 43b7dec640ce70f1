pub mod configuration;
pub mod consistency;
pub mod context;
pub mod error;
pub mod expression;
pub mod record;
pub mod rules;
pub mod scoring;
pub mod uniqueness;
pub mod validation;

// Re-exports pratiques pour simplifier les imports ailleurs
pub use error::DomainError;
pub use record::ExposureRecord;
pub use rules::{BusinessRule, Exemption, QualityDimension, RuleParameter, RuleViolation, Severity};
