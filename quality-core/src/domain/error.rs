// quality-core/src/domain/error.rs

use crate::domain::expression::ExpressionError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Rule '{rule_id}' could not be executed: {source}")]
    #[diagnostic(
        code(quality::domain::rule_execution),
        help("Expression: `{expression}`. The rule is skipped for this record; fix it in the rule store.")
    )]
    RuleExecution {
        rule_id: String,
        expression: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Invalid quality weights: {0}")]
    #[diagnostic(
        code(quality::domain::weights),
        help("Each weight must be within [0, 1] and all weights must sum to 1.0.")
    )]
    InvalidWeights(String),

    #[error("Invalid engine configuration: {0}")]
    #[diagnostic(code(quality::domain::configuration))]
    InvalidConfiguration(String),
}
