// quality-core/src/domain/rules/violation.rs

use super::model::{BusinessRule, QualityDimension, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub record_id: String,
    pub dimension: QualityDimension,
    pub severity: Severity,
    pub message: String,
}

impl RuleViolation {
    pub fn from_rule(rule: &BusinessRule, record_id: &str) -> Self {
        Self {
            rule_id: rule.id.clone(),
            record_id: record_id.to_string(),
            dimension: rule.dimension,
            severity: rule.severity,
            message: render_message(rule, record_id),
        }
    }
}

fn render_message(rule: &BusinessRule, record_id: &str) -> String {
    match rule.message.as_deref() {
        Some(template) => template
            .replace("{ruleId}", &rule.id)
            .replace("{recordId}", record_id)
            .replace("{dimension}", rule.dimension.as_str())
            .replace("{severity}", rule.severity.as_str()),
        None => {
            let what = rule
                .description
                .as_deref()
                .or(rule.name.as_deref())
                .unwrap_or(&rule.expression);
            format!(
                "[{}/{}] Rule '{}' failed for record '{}': {}",
                rule.dimension, rule.severity, rule.id, record_id, what
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemptionReason {
    /// The evaluation date is outside the rule's effective window.
    OutsideEffectiveWindow,
    /// An explicit waiver covers this (rule, entity) pair.
    Waiver,
}

/// A rule that could not be evaluated for a record (authoring error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule_id: String,
    pub dimension: QualityDimension,
    pub expression: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Passed,
    Violated(RuleViolation),
    Exempted { reason: ExemptionReason },
    Failed(RuleFailure),
}

impl ExecutionOutcome {
    /// Only Passed and Violated count toward dimension scores.
    pub fn is_counted(&self) -> bool {
        matches!(self, ExecutionOutcome::Passed | ExecutionOutcome::Violated(_))
    }
}
