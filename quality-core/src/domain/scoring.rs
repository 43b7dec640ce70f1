// quality-core/src/domain/scoring.rs

// Pure aggregation: per-dimension scores, overall weighted score, grade.

use crate::domain::configuration::{QualityWeights, ScoringConfig};
use crate::domain::consistency::ConsistencyValidationResult;
use crate::domain::rules::QualityDimension;
use crate::domain::uniqueness::UniquenessReport;
use crate::domain::validation::RecordResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityGrade {
    Excellent,
    VeryGood,
    Good,
    Acceptable,
    Poor,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 95.0 => QualityGrade::Excellent,
            s if s >= 90.0 => QualityGrade::VeryGood,
            s if s >= 80.0 => QualityGrade::Good,
            s if s >= 70.0 => QualityGrade::Acceptable,
            _ => QualityGrade::Poor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: QualityDimension,
    /// 0..=100, 100 when nothing was evaluated.
    pub score: f64,
    pub evaluated_records: usize,
    pub failing_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub dimensions: BTreeMap<QualityDimension, DimensionScore>,
    pub consistency_score: f64,
    pub overall_score: f64,
    pub grade: QualityGrade,
    pub compliant: bool,
}

impl QualityScores {
    pub fn dimension(&self, dimension: QualityDimension) -> f64 {
        self.dimensions.get(&dimension).map_or(100.0, |d| d.score)
    }
}

pub struct ScoreAggregator {
    weights: QualityWeights,
    compliance_threshold: f64,
}

impl ScoreAggregator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            weights: config.weights,
            compliance_threshold: config.compliance_threshold,
        }
    }

    pub fn aggregate<'a>(
        &self,
        records: impl IntoIterator<Item = &'a RecordResult> + Clone,
        uniqueness: &UniquenessReport,
        consistency: &ConsistencyValidationResult,
    ) -> QualityScores {
        let dimensions: BTreeMap<QualityDimension, DimensionScore> = QualityDimension::ALL
            .iter()
            .map(|&dimension| {
                let score = Self::dimension_score(dimension, records.clone(), uniqueness);
                (dimension, score)
            })
            .collect();

        let weighted: f64 = dimensions
            .values()
            .map(|d| self.weights.for_dimension(d.dimension) * d.score)
            .sum::<f64>()
            + self.weights.consistency_checks * consistency.overall_score;
        let overall_score = weighted.clamp(0.0, 100.0);

        QualityScores {
            dimensions,
            consistency_score: consistency.overall_score,
            overall_score,
            grade: QualityGrade::from_score(overall_score),
            compliant: overall_score >= self.compliance_threshold,
        }
    }

    /// Records that passed or violated at least one rule of the dimension are counted.
    /// Failed, exempted and not-evaluated outcomes stay out of both sides of the ratio.
    /// Uniqueness additionally counts every evaluated record, duplicates as failing.
    fn dimension_score<'a>(
        dimension: QualityDimension,
        records: impl IntoIterator<Item = &'a RecordResult>,
        uniqueness: &UniquenessReport,
    ) -> DimensionScore {
        let mut evaluated = 0usize;
        let mut failing = 0usize;

        for record in records.into_iter().filter(|r| r.is_evaluated()) {
            let duplicate =
                dimension == QualityDimension::Uniqueness && uniqueness.is_flagged(record.position);
            let counted = dimension == QualityDimension::Uniqueness
                || record.evaluated_dimensions.contains(&dimension);
            if !counted {
                continue;
            }
            evaluated += 1;
            if duplicate || record.has_violation_in(dimension) {
                failing += 1;
            }
        }

        let score = if evaluated == 0 {
            100.0
        } else {
            100.0 * (evaluated - failing) as f64 / evaluated as f64
        };

        DimensionScore {
            dimension,
            score,
            evaluated_records: evaluated,
            failing_records: failing,
        }
    }
}
