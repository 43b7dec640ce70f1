// quality-core/src/domain/consistency.rs

// Batch-wide relational checks. They need the whole batch, so they run after
// per-record validation. Every check is O(n) and tolerates absent inputs.

use crate::domain::configuration::ConsistencyConfig;
use crate::domain::record::ExposureRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

const MISSING: &str = "<missing>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyCheckType {
    RecordCount,
    ReferenceMapping,
    IdentityMapping,
    DominantCurrency,
}

impl fmt::Display for ConsistencyCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConsistencyCheckType::RecordCount => "RECORD_COUNT",
            ConsistencyCheckType::ReferenceMapping => "REFERENCE_MAPPING",
            ConsistencyCheckType::IdentityMapping => "IDENTITY_MAPPING",
            ConsistencyCheckType::DominantCurrency => "DOMINANT_CURRENCY",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyViolation {
    pub check_type: ConsistencyCheckType,
    pub affected_entity: String,
    pub expected_value: String,
    pub actual_value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyCheckResult {
    pub check_type: ConsistencyCheckType,
    /// 0..=100
    pub score: f64,
    pub passed: bool,
    pub violations: Vec<ConsistencyViolation>,
}

impl ConsistencyCheckResult {
    fn trivially_passed(check_type: ConsistencyCheckType) -> Self {
        Self {
            check_type,
            score: 100.0,
            passed: true,
            violations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyValidationResult {
    pub checks: Vec<ConsistencyCheckResult>,
    /// Unweighted mean of the check scores.
    pub overall_score: f64,
    pub passed: bool,
}

impl ConsistencyValidationResult {
    pub fn from_checks(checks: Vec<ConsistencyCheckResult>) -> Self {
        let overall_score = if checks.is_empty() {
            100.0
        } else {
            checks.iter().map(|c| c.score).sum::<f64>() / checks.len() as f64
        };
        let passed = checks.iter().all(|c| c.passed);
        Self {
            checks,
            overall_score,
            passed,
        }
    }

    pub fn check(&self, check_type: ConsistencyCheckType) -> Option<&ConsistencyCheckResult> {
        self.checks.iter().find(|c| c.check_type == check_type)
    }

    pub fn violations(&self) -> impl Iterator<Item = &ConsistencyViolation> {
        self.checks.iter().flat_map(|c| c.violations.iter())
    }
}

pub struct ConsistencyChecker {
    config: ConsistencyConfig,
}

impl ConsistencyChecker {
    pub fn new(config: ConsistencyConfig) -> Self {
        Self { config }
    }

    pub fn check(
        &self,
        records: &[ExposureRecord],
        declared_count: Option<usize>,
        references: Option<&[String]>,
    ) -> ConsistencyValidationResult {
        ConsistencyValidationResult::from_checks(vec![
            Self::check_record_count(records, declared_count),
            self.check_reference_mapping(records, references),
            Self::check_identity_mapping(records),
            self.check_dominant_currency(records),
        ])
    }

    pub fn check_record_count(
        records: &[ExposureRecord],
        declared_count: Option<usize>,
    ) -> ConsistencyCheckResult {
        let kind = ConsistencyCheckType::RecordCount;
        let Some(declared) = declared_count else {
            return ConsistencyCheckResult::trivially_passed(kind);
        };
        let actual = records.len();
        if declared == actual {
            return ConsistencyCheckResult::trivially_passed(kind);
        }

        ConsistencyCheckResult {
            check_type: kind,
            score: 0.0,
            passed: false,
            violations: vec![ConsistencyViolation {
                check_type: kind,
                affected_entity: "BATCH".into(),
                expected_value: declared.to_string(),
                actual_value: actual.to_string(),
                description: format!(
                    "Declared record count {declared} does not match {actual} records received"
                ),
            }],
        }
    }

    /// Every external reference must point at an existing exposure id.
    pub fn check_reference_mapping(
        &self,
        records: &[ExposureRecord],
        references: Option<&[String]>,
    ) -> ConsistencyCheckResult {
        let kind = ConsistencyCheckType::ReferenceMapping;
        let references = match references {
            Some(r) if !r.is_empty() => r,
            _ => return ConsistencyCheckResult::trivially_passed(kind),
        };

        let ids: HashSet<&str> = records
            .iter()
            .filter_map(|r| r.exposure_id.as_deref())
            .collect();

        let violations: Vec<ConsistencyViolation> = references
            .iter()
            .filter(|reference| !ids.contains(reference.as_str()))
            .map(|reference| ConsistencyViolation {
                check_type: kind,
                affected_entity: reference.clone(),
                expected_value: "existing exposure".into(),
                actual_value: "no matching exposure".into(),
                description: format!("Reference '{reference}' does not map to any exposure"),
            })
            .collect();

        let matched = references.len() - violations.len();
        let score = 100.0 * matched as f64 / references.len() as f64;
        ConsistencyCheckResult {
            check_type: kind,
            score,
            passed: score >= self.config.reference_match_threshold,
            violations,
        }
    }

    /// One legal-entity identifier must map to exactly one counterparty id.
    pub fn check_identity_mapping(records: &[ExposureRecord]) -> ConsistencyCheckResult {
        let kind = ConsistencyCheckType::IdentityMapping;

        // 1. Group counterparty ids by LEI (blank LEIs are ignored)
        let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for record in records {
            let Some(lei) = record
                .counterparty_lei
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
            else {
                continue;
            };
            let counterparty = record
                .counterparty_id
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(MISSING);
            groups.entry(lei).or_default().insert(counterparty);
        }

        if groups.is_empty() {
            return ConsistencyCheckResult::trivially_passed(kind);
        }

        // 2. Any group with more than one id is a conflict
        let violations: Vec<ConsistencyViolation> = groups
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(lei, ids)| {
                let listed = ids.iter().copied().collect::<Vec<_>>().join(", ");
                ConsistencyViolation {
                    check_type: kind,
                    affected_entity: lei.to_string(),
                    expected_value: "single counterparty id".into(),
                    actual_value: listed.clone(),
                    description: format!(
                        "LEI '{lei}' is associated with {} counterparty ids: {listed}",
                        ids.len()
                    ),
                }
            })
            .collect();

        let consistent = groups.len() - violations.len();
        ConsistencyCheckResult {
            check_type: kind,
            score: 100.0 * consistent as f64 / groups.len() as f64,
            passed: violations.is_empty(),
            violations,
        }
    }

    /// A batch is expected to be reported mostly in one currency.
    pub fn check_dominant_currency(&self, records: &[ExposureRecord]) -> ConsistencyCheckResult {
        let kind = ConsistencyCheckType::DominantCurrency;

        let mut frequencies: BTreeMap<String, usize> = BTreeMap::new();
        let mut present = 0usize;
        for currency in records
            .iter()
            .filter_map(|r| r.currency.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            *frequencies.entry(currency.to_ascii_uppercase()).or_default() += 1;
            present += 1;
        }

        if frequencies.len() <= 1 {
            return ConsistencyCheckResult::trivially_passed(kind);
        }

        // Ties resolve to the alphabetically first value (BTreeMap order, strict comparison)
        let mut dominant: Option<(&str, usize)> = None;
        for (value, count) in &frequencies {
            if dominant.is_none_or(|(_, best)| *count > best) {
                dominant = Some((value.as_str(), *count));
            }
        }
        let Some((dominant, count)) = dominant else {
            return ConsistencyCheckResult::trivially_passed(kind);
        };

        let share = 100.0 * count as f64 / present as f64;
        let passed = share >= self.config.dominance_threshold;
        let violations = if passed {
            Vec::new()
        } else {
            let distribution = frequencies
                .iter()
                .map(|(value, n)| format!("{value}={n}"))
                .collect::<Vec<_>>()
                .join(", ");
            vec![ConsistencyViolation {
                check_type: kind,
                affected_entity: dominant.to_string(),
                expected_value: format!(">= {:.1}%", self.config.dominance_threshold),
                actual_value: format!("{share:.2}%"),
                description: format!(
                    "No currency reaches {:.1}% of the batch (dominant {dominant} at {share:.2}%; {distribution})",
                    self.config.dominance_threshold
                ),
            }]
        };

        ConsistencyCheckResult {
            check_type: kind,
            // The share only lowers the score once the check fails
            score: if passed { 100.0 } else { share },
            passed,
            violations,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn exposure(id: &str) -> ExposureRecord {
        ExposureRecord::new(id)
    }

    fn with_lei(id: &str, lei: &str, counterparty: &str) -> ExposureRecord {
        ExposureRecord {
            counterparty_lei: Some(lei.into()),
            counterparty_id: Some(counterparty.into()),
            ..exposure(id)
        }
    }

    fn with_currency(id: &str, currency: &str) -> ExposureRecord {
        ExposureRecord {
            currency: Some(currency.into()),
            ..exposure(id)
        }
    }

    fn checker() -> ConsistencyChecker {
        ConsistencyChecker::new(ConsistencyConfig::default())
    }

    #[test]
    fn test_count_matches() {
        let records = vec![exposure("A"), exposure("B")];
        let result = ConsistencyChecker::check_record_count(&records, Some(2));
        assert_eq!(result.score, 100.0);
        assert!(result.passed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_count_mismatch() {
        let records = vec![exposure("A"), exposure("B")];
        let result = ConsistencyChecker::check_record_count(&records, Some(3));
        assert_eq!(result.score, 0.0);
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].expected_value, "3");
        assert_eq!(result.violations[0].actual_value, "2");
    }

    #[test]
    fn test_absent_inputs_pass() {
        let result = checker().check(&[], None, None);
        assert_eq!(result.checks.len(), 4);
        assert!(result.passed);
        assert_eq!(result.overall_score, 100.0);

        let empty: Vec<String> = vec![];
        let refs = checker().check_reference_mapping(&[], Some(empty.as_slice()));
        assert_eq!(refs.score, 100.0);
    }

    #[test]
    fn test_reference_mapping_partial() {
        let records = vec![exposure("A"), exposure("C")];
        let references = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let result = checker().check_reference_mapping(&records, Some(references.as_slice()));

        assert!((result.score - 66.666).abs() < 0.01);
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].affected_entity, "B");
    }

    #[test]
    fn test_identity_conflict() {
        let records = vec![
            with_lei("E1", "LEI1", "X"),
            with_lei("E2", "LEI1", "X"),
            with_lei("E3", "LEI1", "Y"),
            with_lei("E4", "LEI2", "Z"),
        ];
        let result = ConsistencyChecker::check_identity_mapping(&records);

        assert!(!result.passed);
        assert_eq!(result.score, 50.0);
        assert_eq!(result.violations.len(), 1);
        let violation = &result.violations[0];
        assert_eq!(violation.affected_entity, "LEI1");
        assert_eq!(violation.actual_value, "X, Y");
    }

    #[test]
    fn test_identity_ignores_blank_lei() {
        let records = vec![with_lei("E1", "  ", "X"), with_lei("E2", "", "Y")];
        let result = ConsistencyChecker::check_identity_mapping(&records);
        assert!(result.passed);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_dominant_currency_below_threshold() {
        let mut records: Vec<_> = (0..8).map(|i| with_currency(&format!("E{i}"), "EUR")).collect();
        records.push(with_currency("U1", "USD"));
        records.push(with_currency("U2", "usd"));
        records.push(exposure("NO_CCY"));

        let result = checker().check_dominant_currency(&records);
        assert!(!result.passed);
        assert_eq!(result.score, 80.0);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].affected_entity, "EUR");
    }

    #[test]
    fn test_dominant_currency_single_value() {
        let records = vec![with_currency("A", "EUR"), with_currency("B", "EUR")];
        let result = checker().check_dominant_currency(&records);
        assert!(result.passed);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_dominant_currency_above_threshold_scores_full() {
        let mut records: Vec<_> = (0..19).map(|i| with_currency(&format!("E{i}"), "EUR")).collect();
        records.push(with_currency("U1", "USD"));

        let result = checker().check_dominant_currency(&records);
        assert!(result.passed);
        assert!(result.violations.is_empty());
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_dominant_tie_breaks_alphabetically() {
        let records = vec![with_currency("A", "USD"), with_currency("B", "EUR")];
        let result = checker().check_dominant_currency(&records);
        assert_eq!(result.score, 50.0);
        assert_eq!(result.violations[0].affected_entity, "EUR");
    }

    #[test]
    fn test_overall_is_mean_of_checks() {
        let records = vec![exposure("A")];
        let result = checker().check(&records, Some(2), None);
        assert_eq!(result.overall_score, 75.0);
        assert_eq!(result.violations().count(), 1);
    }
}
