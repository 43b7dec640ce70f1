// quality-core/src/domain/expression/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum ExpressionError {
    #[error("Syntax error at offset {position}: {message}")]
    #[diagnostic(code(quality::expression::syntax))]
    Syntax { position: usize, message: String },

    #[error("Unknown function '{0}'")]
    #[diagnostic(
        code(quality::expression::unknown_function),
        help("Available: DAYS_BETWEEN, TODAY, NOW, DATE, ABS, MIN, MAX, COALESCE.")
    )]
    UnknownFunction(String),

    #[error("Unknown method '{0}'")]
    #[diagnostic(code(quality::expression::unknown_method))]
    UnknownMethod(String),

    #[error("'{name}' expects {expected} argument(s), got {actual}")]
    #[diagnostic(code(quality::expression::arity))]
    Arity {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("Invalid regular expression '{pattern}': {message}")]
    #[diagnostic(code(quality::expression::pattern))]
    InvalidPattern { pattern: String, message: String },

    #[error("Type error: {0}")]
    #[diagnostic(code(quality::expression::type_mismatch))]
    Type(String),

    #[error("Method '{0}' called on a null value")]
    #[diagnostic(
        code(quality::expression::null_receiver),
        help("Guard the call, e.g. `#field == null || #field.trim().isEmpty()`.")
    )]
    NullReceiver(String),

    #[error("Evaluation error: {0}")]
    #[diagnostic(code(quality::expression::evaluation))]
    Evaluation(String),

    #[error("Expression too complex: {0}")]
    #[diagnostic(code(quality::expression::too_complex))]
    TooComplex(String),
}

impl ExpressionError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            position,
            message: message.into(),
        }
    }
}
