// quality-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::rule_store::RuleStoreError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum QualityError {
    // --- DOMAIN ERRORS (rules, configuration invariants) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, parsing) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- RULE STORE: fatal to the whole batch ---
    #[error("Failed to load rule set for bank '{bank_id}' (batch '{batch_id}'): {source}")]
    #[diagnostic(
        code(quality::rule_store::load),
        help("The batch was not validated: a partial rule set would produce silently wrong scores.")
    )]
    RuleStoreLoad {
        bank_id: String,
        batch_id: String,
        #[source]
        source: RuleStoreError,
    },

    // --- GENERIC / APPLICATION ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for QualityError {
    fn from(err: std::io::Error) -> Self {
        QualityError::Infrastructure(InfrastructureError::Io(err))
    }
}
