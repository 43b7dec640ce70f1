// quality-core/src/domain/validation.rs

use crate::domain::consistency::ConsistencyValidationResult;
use crate::domain::rules::{
    BusinessRule, ExecutionOutcome, ExemptionReason, QualityDimension, RuleFailure,
    RuleViolation, Severity,
};
use crate::domain::scoring::QualityScores;
use crate::domain::uniqueness::UniquenessReport;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Valid,
    Invalid,
    /// Deadline reached or worker lost before this record was processed.
    NotEvaluated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExemption {
    pub rule_id: String,
    pub reason: ExemptionReason,
}

/// Outcome of every rule for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub record_id: String,
    /// Position of the record in the submitted batch.
    pub position: usize,
    pub status: RecordStatus,
    pub violations: Vec<RuleViolation>,
    pub failures: Vec<RuleFailure>,
    pub exemptions: Vec<RuleExemption>,
    /// Dimensions with at least one rule that passed or failed for this record.
    pub evaluated_dimensions: BTreeSet<QualityDimension>,
}

impl RecordResult {
    pub fn new(record_id: impl Into<String>, position: usize) -> Self {
        Self {
            record_id: record_id.into(),
            position,
            status: RecordStatus::Valid,
            violations: Vec::new(),
            failures: Vec::new(),
            exemptions: Vec::new(),
            evaluated_dimensions: BTreeSet::new(),
        }
    }

    pub fn not_evaluated(record_id: impl Into<String>, position: usize) -> Self {
        Self {
            status: RecordStatus::NotEvaluated,
            ..Self::new(record_id, position)
        }
    }

    pub fn record(&mut self, rule: &BusinessRule, outcome: ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Passed => {
                self.evaluated_dimensions.insert(rule.dimension);
            }
            ExecutionOutcome::Violated(violation) => {
                self.evaluated_dimensions.insert(rule.dimension);
                self.violations.push(violation);
                self.status = RecordStatus::Invalid;
            }
            ExecutionOutcome::Exempted { reason } => self.exemptions.push(RuleExemption {
                rule_id: rule.id.clone(),
                reason,
            }),
            // Failed rules count neither as pass nor as violation
            ExecutionOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.status != RecordStatus::NotEvaluated
    }

    pub fn passed(&self) -> bool {
        self.status == RecordStatus::Valid
    }

    pub fn has_violation_in(&self, dimension: QualityDimension) -> bool {
        self.violations.iter().any(|v| v.dimension == dimension)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Complete,
    /// Some records were not evaluated (deadline or worker failure).
    Partial,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub not_evaluated_records: usize,
    pub total_violations: usize,
    pub total_failures: usize,
    pub total_exemptions: usize,
    pub consistency_violations: usize,
    pub duplicate_records: usize,
    pub violations_by_severity: BTreeMap<Severity, usize>,
    pub violations_by_dimension: BTreeMap<QualityDimension, usize>,
}

impl ValidationSummary {
    pub fn build<'a>(
        records: impl IntoIterator<Item = &'a RecordResult>,
        consistency: &ConsistencyValidationResult,
        uniqueness: &UniquenessReport,
    ) -> Self {
        let mut summary = ValidationSummary {
            consistency_violations: consistency.violations().count(),
            duplicate_records: uniqueness.flagged_count(),
            ..Default::default()
        };

        for record in records {
            summary.total_records += 1;
            match record.status {
                RecordStatus::Valid => summary.valid_records += 1,
                RecordStatus::Invalid => summary.invalid_records += 1,
                RecordStatus::NotEvaluated => summary.not_evaluated_records += 1,
            }
            summary.total_violations += record.violations.len();
            summary.total_failures += record.failures.len();
            summary.total_exemptions += record.exemptions.len();
            for violation in &record.violations {
                *summary
                    .violations_by_severity
                    .entry(violation.severity)
                    .or_default() += 1;
                *summary
                    .violations_by_dimension
                    .entry(violation.dimension)
                    .or_default() += 1;
            }
        }

        summary
    }
}

/// Everything the engine knows about one batch. Built once, handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationBatchResult {
    pub batch_id: String,
    pub bank_id: String,
    pub as_of: NaiveDate,
    pub status: BatchStatus,
    /// Keyed by record id (see `record_key`).
    pub records: BTreeMap<String, RecordResult>,
    pub consistency: ConsistencyValidationResult,
    pub uniqueness: UniquenessReport,
    pub scores: QualityScores,
    pub summary: ValidationSummary,
    pub duration_ms: u64,
}

impl ValidationBatchResult {
    pub fn record(&self, record_id: &str) -> Option<&RecordResult> {
        self.records.get(record_id)
    }

    pub fn violations(&self) -> impl Iterator<Item = &RuleViolation> {
        self.records.values().flat_map(|r| r.violations.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleFailure> {
        self.records.values().flat_map(|r| r.failures.iter())
    }

    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Complete
    }
}

/// Result key of the record at `position`. The first occurrence of an id keeps it;
/// repeated ids become `{id}#{position}`, records without id `#{position}`.
pub fn record_key(id: Option<&str>, position: usize, seen: &mut BTreeSet<String>) -> String {
    let mut key = match id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id.to_string(),
        None => format!("#{position}"),
    };
    while !seen.insert(key.clone()) {
        key = format!("{key}#{position}");
    }
    key
}
