// quality-core/src/application/engine.rs

use crate::application::audit::{AuditDispatcher, AuditPublisher, AuditStats};
use crate::application::cache::{BatchKey, RuleCache};
use crate::application::coordinator::ValidationCoordinator;
use crate::application::executor::RuleExecutor;
use crate::domain::configuration::{EngineConfig, ValidationConfig};
use crate::domain::consistency::ConsistencyChecker;
use crate::domain::record::ExposureRecord;
use crate::domain::scoring::ScoreAggregator;
use crate::domain::uniqueness::UniquenessChecker;
use crate::domain::validation::{BatchStatus, ValidationBatchResult, ValidationSummary};
use crate::error::QualityError;
use crate::ports::audit::AuditSink;
use crate::ports::rule_store::RuleStore;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Input of one validation call.
#[derive(Debug, Clone, Default)]
pub struct ExposureBatch {
    pub batch_id: String,
    pub records: Vec<ExposureRecord>,
    /// Record count announced by the batch metadata.
    pub declared_count: Option<usize>,
    /// External references that must each match an exposure id.
    pub references: Option<Vec<String>>,
}

impl ExposureBatch {
    pub fn new(batch_id: impl Into<String>, records: Vec<ExposureRecord>) -> Self {
        Self {
            batch_id: batch_id.into(),
            records,
            declared_count: None,
            references: None,
        }
    }

    pub fn with_declared_count(mut self, count: usize) -> Self {
        self.declared_count = Some(count);
        self
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = Some(references);
        self
    }
}

pub struct QualityEngine {
    cache: Arc<RuleCache>,
    coordinator: ValidationCoordinator,
    consistency: ConsistencyChecker,
    aggregator: ScoreAggregator,
    validation: ValidationConfig,
    audit: Option<AuditDispatcher>,
}

impl QualityEngine {
    /// Engine without execution log.
    pub fn new(store: Arc<dyn RuleStore>, config: EngineConfig) -> Result<Self, QualityError> {
        let config = config.validated()?;
        Ok(Self::assemble(store, config, None))
    }

    /// Engine with an execution log sink. Must be called inside a tokio runtime.
    pub fn with_audit(
        store: Arc<dyn RuleStore>,
        sink: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Result<Self, QualityError> {
        let config = config.validated()?;
        let dispatcher = config
            .audit
            .enabled
            .then(|| AuditDispatcher::spawn(sink, config.audit.queue_capacity));
        Ok(Self::assemble(store, config, dispatcher))
    }

    fn assemble(
        store: Arc<dyn RuleStore>,
        config: EngineConfig,
        audit: Option<AuditDispatcher>,
    ) -> Self {
        let publisher = audit
            .as_ref()
            .map_or_else(AuditPublisher::disabled, AuditDispatcher::publisher);
        let executor = Arc::new(RuleExecutor::new(
            publisher,
            Duration::from_millis(config.performance.slow_rule_warn_ms),
        ));

        Self {
            cache: Arc::new(RuleCache::new(store)),
            coordinator: ValidationCoordinator::new(executor, config.validation.clone()),
            consistency: ConsistencyChecker::new(config.consistency.clone()),
            aggregator: ScoreAggregator::new(&config.scoring),
            validation: config.validation,
            audit,
        }
    }

    /// Validates a batch as of today.
    pub async fn validate(
        &self,
        bank_id: &str,
        batch: ExposureBatch,
    ) -> Result<ValidationBatchResult, QualityError> {
        let today = chrono::Local::now().date_naive();
        self.validate_as_of(bank_id, batch, today).await
    }

    /// Validates a batch against the rules, parameters and exemptions effective on `as_of`.
    /// Only a rule store failure is an error; everything else is reported in the result.
    #[instrument(
        skip(self, batch),
        fields(batch_id = %batch.batch_id, records = batch.records.len())
    )]
    pub async fn validate_as_of(
        &self,
        bank_id: &str,
        batch: ExposureBatch,
        as_of: NaiveDate,
    ) -> Result<ValidationBatchResult, QualityError> {
        let start = Instant::now();
        let deadline = self.validation.deadline().map(|d| start + d);
        let ExposureBatch {
            batch_id,
            records,
            declared_count,
            references,
        } = batch;

        // 1. Rule set (single load per batch)
        let key = BatchKey::new(bank_id, batch_id.clone(), as_of);
        let (lease, rule_set) =
            self.cache
                .for_batch(&key)
                .await
                .map_err(|source| QualityError::RuleStoreLoad {
                    bank_id: bank_id.to_string(),
                    batch_id: batch_id.clone(),
                    source,
                })?;

        // 2. Per-record validation
        let records = Arc::new(records);
        let output = self
            .coordinator
            .validate_all(records.clone(), rule_set, deadline)
            .await;
        drop(lease);

        // 3. Batch-wide checks
        let consistency = self
            .consistency
            .check(&records, declared_count, references.as_deref());
        let uniqueness = UniquenessChecker::check(&records);

        // 4. Scores
        let scores = self
            .aggregator
            .aggregate(output.results.values(), &uniqueness, &consistency);
        let summary = ValidationSummary::build(output.results.values(), &consistency, &uniqueness);

        let status = if output.complete {
            BatchStatus::Complete
        } else {
            BatchStatus::Partial
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            status = ?status,
            valid = summary.valid_records,
            invalid = summary.invalid_records,
            violations = summary.total_violations,
            failures = summary.total_failures,
            overall_score = scores.overall_score,
            grade = ?scores.grade,
            duration_ms,
            "Batch validated"
        );

        Ok(ValidationBatchResult {
            batch_id,
            bank_id: bank_id.to_string(),
            as_of,
            status,
            records: output.results,
            consistency,
            uniqueness,
            scores,
            summary,
            duration_ms,
        })
    }

    pub fn audit_stats(&self) -> Option<AuditStats> {
        self.audit.as_ref().map(AuditDispatcher::stats)
    }

    /// Flushes pending execution logs. Returns their delivery statistics when audit is on.
    pub async fn shutdown(self) -> Option<AuditStats> {
        let QualityEngine {
            coordinator, audit, ..
        } = self;
        // The executor holds a publisher clone; it must go before the queue can close
        drop(coordinator);
        match audit {
            Some(dispatcher) => Some(dispatcher.shutdown().await),
            None => None,
        }
    }
}
