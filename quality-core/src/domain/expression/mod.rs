// quality-core/src/domain/expression/mod.rs

// Sandboxed rule language: comparisons, boolean connectives, membership,
// date arithmetic and string matching. No assignment, no reflection, no I/O.

mod error;
mod eval;
mod lexer;
mod parser;
mod value;

pub use error::ExpressionError;
pub use value::Value;

use chrono::NaiveDate;
use eval::Interpreter;
use lexer::Lexer;
use parser::{Expr, Parser};
use std::collections::HashMap;

pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Named variables visible to an expression.
pub trait Bindings {
    fn resolve(&self, name: &str) -> Option<&Value>;
}

impl Bindings for HashMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Evaluation environment shared by every rule of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalEnv {
    /// Value of `TODAY()` / `NOW()`.
    pub today: NaiveDate,
}

impl EvalEnv {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

/// A parsed, immutable expression. Cheap to share across workers.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        if source.len() > MAX_EXPRESSION_LEN {
            return Err(ExpressionError::TooComplex(format!(
                "expression longer than {MAX_EXPRESSION_LEN} bytes"
            )));
        }
        let tokens = Lexer::new(source).tokenize()?;
        let root = Parser::new(tokens).parse()?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, bindings: &dyn Bindings, env: &EvalEnv) -> Result<Value, ExpressionError> {
        Interpreter::new(bindings, env)
            .eval(&self.root)
            .map(|value| value.into_owned())
    }

    /// Evaluates and coerces the result to a boolean (null is false).
    pub fn evaluate_bool(&self, bindings: &dyn Bindings, env: &EvalEnv) -> Result<bool, ExpressionError> {
        let interpreter = Interpreter::new(bindings, env);
        Ok(interpreter.eval(&self.root)?.truthy())
    }
}

/// One-shot parse and evaluate.
pub fn evaluate(
    expression: &str,
    bindings: &dyn Bindings,
    env: &EvalEnv,
) -> Result<bool, ExpressionError> {
    Expression::parse(expression)?.evaluate_bool(bindings, env)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn env() -> EvalEnv {
        EvalEnv::new(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap())
    }

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn check(expression: &str, bindings: &HashMap<String, Value>) -> bool {
        evaluate(expression, bindings, &env()).unwrap()
    }

    #[test]
    fn test_undefined_variable_is_null() {
        let empty = HashMap::new();
        assert!(check("#amount == null || #amount > 0", &empty));
        assert!(!check("#amount != null && #amount > 0", &empty));
        // Ordering against null is false, not an error
        assert!(!check("#amount > 0", &empty));
    }

    #[test]
    fn test_precedence() {
        let empty = HashMap::new();
        assert!(check("1 + 2 * 3 == 7", &empty));
        assert!(check("true || false && false", &empty));
        assert!(check("!(1 > 2) and not false", &empty));
        assert!(check("-2 < 1 - 2 + 0.5", &empty));
    }

    #[test]
    fn test_string_methods() {
        let b = vars(&[("exposureId", " ".into()), ("leiCode", "529900T8BM49AURSDO55".into())]);
        assert!(!check("#exposureId != null && !#exposureId.trim().isEmpty()", &b));
        assert!(check("#leiCode.matches('[A-Z0-9]{20}')", &b));
        assert!(!check("#leiCode.matches('[A-Z0-9]{5}')", &b));
        assert!(check("#leiCode.startsWith('5299') && #leiCode.length() == 20", &b));
        assert!(check("'abc'.equalsIgnoreCase('ABC')", &b));
    }

    #[test]
    fn test_membership() {
        let b = vars(&[
            ("currency", "eur".into()),
            ("validCurrencies", Value::parse_list("USD,EUR,GBP")),
        ]);
        assert!(check("#validCurrencies.contains(#currency.toUpperCase())", &b));
        assert!(check("#currency.toUpperCase() in #validCurrencies", &b));
        assert!(check("'JPY' not in #validCurrencies", &b));
        assert!(check("'EUR' in {'EUR', 'CHF'}", &b));
        assert!(!check("#missing in #validCurrencies", &b));
    }

    #[test]
    fn test_dates() {
        let reporting = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let b = vars(&[
            ("reportingDate", reporting.into()),
            ("maturityDate", "2023-12-31".into()),
            ("maxReportingAgeDays", Value::Number(90.0)),
        ]);
        assert!(check("DAYS_BETWEEN(#reportingDate, TODAY()) == 60", &b));
        assert!(check(
            "DAYS_BETWEEN(#reportingDate, TODAY()) <= #maxReportingAgeDays",
            &b
        ));
        assert!(check("!#reportingDate.isAfter(TODAY())", &b));
        assert!(check("DATE(#maturityDate).isBefore(#reportingDate)", &b));
        assert!(check("#reportingDate.plusDays(60) == NOW()", &b));
        assert!(check("TODAY() - #reportingDate == 60", &b));
        assert!(check("DAYS_BETWEEN(#missing, TODAY()) == null", &b));
    }

    #[test]
    fn test_functions() {
        let empty = HashMap::new();
        assert!(check("ABS(-5) == 5", &empty));
        assert!(check("MIN(3, 1, 2) == 1 && MAX(3, 1, 2) == 3", &empty));
        assert!(check("COALESCE(#missing, 'x') == 'x'", &empty));
    }

    #[test]
    fn test_bare_identifiers_are_variables() {
        let b = vars(&[("amount", Value::Number(10.0))]);
        assert!(check("amount > 5", &b));
    }

    #[test]
    fn test_result_coercion() {
        let b = vars(&[("name", "x".into())]);
        assert!(check("#name", &b));
        assert!(!check("#other", &b));
        assert!(!check("0", &b));
    }

    #[test]
    fn test_null_receiver_is_an_error() {
        let err = evaluate("#leiCode.trim() == ''", &HashMap::new(), &env()).unwrap_err();
        assert_eq!(err, ExpressionError::NullReceiver("trim".into()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Expression::parse("#a >").unwrap_err(),
            ExpressionError::Syntax { .. }
        ));
        assert!(matches!(
            Expression::parse("EXEC('rm')").unwrap_err(),
            ExpressionError::UnknownFunction(_)
        ));
        assert!(matches!(
            Expression::parse("#a.getClass()").unwrap_err(),
            ExpressionError::UnknownMethod(_)
        ));
        assert!(matches!(
            Expression::parse("DAYS_BETWEEN(#a)").unwrap_err(),
            ExpressionError::Arity { .. }
        ));
        assert!(matches!(
            Expression::parse("#a.matches('[unclosed')").unwrap_err(),
            ExpressionError::InvalidPattern { .. }
        ));
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("(1 == 1").is_err());
    }

    #[test]
    fn test_complexity_limits() {
        let deep = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(
            Expression::parse(&deep).unwrap_err(),
            ExpressionError::TooComplex(_)
        ));

        let long = "1 + ".repeat(1100) + "1";
        assert!(matches!(
            Expression::parse(&long).unwrap_err(),
            ExpressionError::TooComplex(_)
        ));
    }

    #[test]
    fn test_division_by_zero() {
        let err = evaluate("1 / 0 == 1", &HashMap::new(), &env()).unwrap_err();
        assert!(matches!(err, ExpressionError::Evaluation(_)));
    }
}
