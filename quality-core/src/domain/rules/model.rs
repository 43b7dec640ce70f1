// quality-core/src/domain/rules/model.rs

use crate::domain::expression::Value;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityDimension {
    Completeness,
    Accuracy,
    Consistency,
    Timeliness,
    Uniqueness,
    Validity,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 6] = [
        QualityDimension::Completeness,
        QualityDimension::Accuracy,
        QualityDimension::Consistency,
        QualityDimension::Timeliness,
        QualityDimension::Uniqueness,
        QualityDimension::Validity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityDimension::Completeness => "COMPLETENESS",
            QualityDimension::Accuracy => "ACCURACY",
            QualityDimension::Consistency => "CONSISTENCY",
            QualityDimension::Timeliness => "TIMELINESS",
            QualityDimension::Uniqueness => "UNIQUENESS",
            QualityDimension::Validity => "VALIDITY",
        }
    }
}

impl fmt::Display for QualityDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_enabled() -> bool {
    true
}

/// A stored rule definition. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub id: String,
    /// `None` means the rule applies to every bank.
    #[serde(default)]
    pub bank_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub expression: String,
    pub severity: Severity,
    pub dimension: QualityDimension,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub execution_order: i32,
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    /// Violation message template. Placeholders: `{ruleId}`, `{recordId}`,
    /// `{dimension}`, `{severity}`.
    #[serde(default)]
    pub message: Option<String>,
}

impl BusinessRule {
    pub fn new(
        id: impl Into<String>,
        expression: impl Into<String>,
        dimension: QualityDimension,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            bank_id: None,
            name: None,
            description: None,
            expression: expression.into(),
            severity,
            dimension,
            enabled: true,
            execution_order: 0,
            effective_from: None,
            effective_to: None,
            message: None,
        }
    }

    /// Inclusive `[effective_from, effective_to]`, open-ended when a bound is missing.
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from.is_none_or(|from| from <= date)
            && self.effective_to.is_none_or(|to| date <= to)
    }

    pub fn applies_to_bank(&self, bank_id: &str) -> bool {
        self.bank_id.as_deref().is_none_or(|b| b == bank_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Text,
    Number,
    Integer,
    Boolean,
    Date,
    List,
}

/// Named, rule-scoped configuration value (thresholds, whitelists...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParameter {
    pub rule_id: String,
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub kind: Option<ParameterKind>,
}

impl RuleParameter {
    pub fn new(rule_id: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            name: name.into(),
            value: value.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Converts the raw string into a rule-language value.
    /// Untyped: comma-separated values become a list, numbers and booleans are detected,
    /// anything else stays text. A typed value that fails to parse falls back to text.
    pub fn typed_value(&self) -> Value {
        let raw = self.value.trim();
        match self.kind {
            Some(ParameterKind::Text) => Value::Text(self.value.clone()),
            Some(ParameterKind::List) => Value::parse_list(raw),
            Some(ParameterKind::Number | ParameterKind::Integer) => match raw.parse::<f64>() {
                Ok(n) if self.kind == Some(ParameterKind::Integer) => Value::Number(n.trunc()),
                Ok(n) => Value::Number(n),
                Err(_) => self.fallback("number"),
            },
            Some(ParameterKind::Boolean) => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => self.fallback("boolean"),
            },
            Some(ParameterKind::Date) => match Value::Text(raw.to_string()).as_date() {
                Some(date) => Value::Date(date),
                None => self.fallback("date"),
            },
            None if raw.contains(',') => Value::parse_list(raw),
            None => {
                if let Ok(n) = raw.parse::<f64>() {
                    Value::Number(n)
                } else if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
                    Value::Bool(raw.eq_ignore_ascii_case("true"))
                } else {
                    Value::Text(self.value.clone())
                }
            }
        }
    }

    fn fallback(&self, expected: &str) -> Value {
        warn!(
            rule_id = %self.rule_id,
            parameter = %self.name,
            value = %self.value,
            "Parameter is not a valid {expected}, using it as text"
        );
        Value::Text(self.value.clone())
    }
}

/// Time-bounded waiver excusing one entity from one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemption {
    pub rule_id: String,
    pub entity_id: String,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Exemption {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from.is_none_or(|from| from <= date) && self.valid_to.is_none_or(|to| date <= to)
    }
}
