// quality-core/src/domain/configuration.rs

use crate::domain::error::DomainError;
use crate::domain::rules::QualityDimension;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Hard cap on concurrent workers, whatever the configuration says.
pub const MAX_IN_FLIGHT_CAP: usize = 64;
const WEIGHT_TOLERANCE: f64 = 0.001;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default, PartialEq)]
pub struct EngineConfig {
    #[validate(nested)]
    #[serde(default)]
    pub validation: ValidationConfig,

    #[validate(nested)]
    #[serde(default)]
    pub audit: AuditConfig,

    #[validate(nested)]
    #[serde(default)]
    pub consistency: ConsistencyConfig,

    #[validate(nested)]
    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl EngineConfig {
    /// Runs field validation and the weight-sum invariant.
    pub fn validated(self) -> Result<Self, DomainError> {
        self.validate()
            .map_err(|e| DomainError::InvalidConfiguration(e.to_string()))?;
        self.scoring.weights.check()?;
        Ok(self)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ValidationConfig {
    #[validate(range(min = 1, max = 64, message = "max_in_flight must be within 1..=64"))]
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Batches smaller than this run as a single chunk.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Records per worker task. 0 = ceil(n / max_in_flight).
    #[serde(default)]
    pub chunk_size: usize,

    #[validate(range(min = 1, message = "batch_deadline_ms must be positive"))]
    #[serde(default)]
    pub batch_deadline_ms: Option<u64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            parallel_threshold: default_parallel_threshold(),
            chunk_size: 0,
            batch_deadline_ms: None,
        }
    }
}

impl ValidationConfig {
    pub fn effective_max_in_flight(&self) -> usize {
        self.max_in_flight.clamp(1, MAX_IN_FLIGHT_CAP)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.batch_deadline_ms.map(Duration::from_millis)
    }

    /// Chunk size for a batch of `total` records.
    pub fn chunk_size_for(&self, total: usize) -> usize {
        if total < self.parallel_threshold {
            return total.max(1);
        }
        if self.chunk_size > 0 {
            return self.chunk_size;
        }
        total.div_ceil(self.effective_max_in_flight()).max(1)
    }
}

fn default_max_in_flight() -> usize {
    8
}
fn default_parallel_threshold() -> usize {
    1000
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pending events beyond this are dropped (and counted).
    #[validate(range(min = 1))]
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_queue_capacity() -> usize {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ConsistencyConfig {
    /// Minimum % of references that must match a record.
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default = "default_ninety")]
    pub reference_match_threshold: f64,

    /// Minimum share (%) the most frequent currency must reach.
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default = "default_ninety")]
    pub dominance_threshold: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            reference_match_threshold: default_ninety(),
            dominance_threshold: default_ninety(),
        }
    }
}

fn default_ninety() -> f64 {
    90.0
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ScoringConfig {
    #[validate(nested)]
    #[serde(default)]
    pub weights: QualityWeights,

    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default = "default_compliance_threshold")]
    pub compliance_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            compliance_threshold: default_compliance_threshold(),
        }
    }
}

fn default_compliance_threshold() -> f64 {
    70.0
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PerformanceConfig {
    #[serde(default = "default_slow_rule_warn_ms")]
    pub slow_rule_warn_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            slow_rule_warn_ms: default_slow_rule_warn_ms(),
        }
    }
}

fn default_slow_rule_warn_ms() -> u64 {
    100
}

/// Weights of the overall score. Six dimensions plus the batch-level consistency checks.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Copy, PartialEq)]
#[validate(schema(function = "validate_weight_sum"))]
#[serde(default)]
pub struct QualityWeights {
    #[validate(range(min = 0.0, max = 1.0))]
    pub completeness: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub accuracy: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub consistency: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub consistency_checks: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub timeliness: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub uniqueness: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub validity: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.25,
            accuracy: 0.25,
            consistency: 0.10,
            consistency_checks: 0.10,
            timeliness: 0.15,
            uniqueness: 0.10,
            validity: 0.05,
        }
    }
}

impl QualityWeights {
    pub fn equal_weights() -> Self {
        let w = 1.0 / 7.0;
        Self {
            completeness: w,
            accuracy: w,
            consistency: w,
            consistency_checks: w,
            timeliness: w,
            uniqueness: w,
            validity: w,
        }
    }

    pub fn for_dimension(&self, dimension: QualityDimension) -> f64 {
        match dimension {
            QualityDimension::Completeness => self.completeness,
            QualityDimension::Accuracy => self.accuracy,
            QualityDimension::Consistency => self.consistency,
            QualityDimension::Timeliness => self.timeliness,
            QualityDimension::Uniqueness => self.uniqueness,
            QualityDimension::Validity => self.validity,
        }
    }

    pub fn total(&self) -> f64 {
        self.completeness
            + self.accuracy
            + self.consistency
            + self.consistency_checks
            + self.timeliness
            + self.uniqueness
            + self.validity
    }

    pub fn check(&self) -> Result<(), DomainError> {
        let all = [
            self.completeness,
            self.accuracy,
            self.consistency,
            self.consistency_checks,
            self.timeliness,
            self.uniqueness,
            self.validity,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DomainError::InvalidWeights(
                "weights must be finite and non-negative".into(),
            ));
        }
        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(DomainError::InvalidWeights(format!(
                "weights sum to {total:.4}, expected 1.0"
            )));
        }
        Ok(())
    }
}

fn validate_weight_sum(weights: &QualityWeights) -> Result<(), ValidationError> {
    weights.check().map_err(|_| {
        let mut err = ValidationError::new("weight_sum");
        err.message = Some("quality weights must sum to 1.0".into());
        err
    })
}
