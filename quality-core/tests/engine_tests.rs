// quality-core/tests/engine_tests.rs

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use quality_core::domain::configuration::EngineConfig;
use quality_core::domain::consistency::ConsistencyCheckType;
use quality_core::domain::rules::{BusinessRule, Exemption, QualityDimension, RuleParameter, Severity};
use quality_core::domain::validation::{BatchStatus, RecordStatus};
use quality_core::domain::ExposureRecord;
use quality_core::infrastructure::config::load_engine_config;
use quality_core::infrastructure::rule_store::{RuleCatalog, YamlRuleStore};
use quality_core::ports::audit::{AuditError, AuditEvent, AuditSink};
use quality_core::ports::rule_store::{RuleStore, RuleStoreError};
use quality_core::{ExposureBatch, QualityEngine, QualityError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Barrier;

// --- HELPERS ---

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

/// Store that counts loads, can be slowed down and can be switched to failure.
struct CountingStore {
    inner: YamlRuleStore,
    loads: AtomicUsize,
    delay_ms: u64,
    fail: AtomicBool,
}

impl CountingStore {
    fn new(catalog: RuleCatalog) -> Arc<Self> {
        Self::slow(catalog, 0)
    }

    fn slow(catalog: RuleCatalog, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: YamlRuleStore::from_catalog(catalog).unwrap(),
            loads: AtomicUsize::new(0),
            delay_ms,
            fail: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RuleStore for CountingStore {
    async fn load_rules(
        &self,
        bank_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<BusinessRule>, RuleStoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RuleStoreError::Unavailable("connection refused".into()));
        }
        self.inner.load_rules(bank_id, as_of).await
    }

    async fn load_parameters(
        &self,
        rule_ids: &[String],
    ) -> Result<Vec<RuleParameter>, RuleStoreError> {
        self.inner.load_parameters(rule_ids).await
    }

    async fn load_exemptions(
        &self,
        rule_ids: &[String],
        as_of: NaiveDate,
    ) -> Result<Vec<Exemption>, RuleStoreError> {
        self.inner.load_exemptions(rule_ids, as_of).await
    }
}

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn record_execution(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Err(AuditError("audit table locked".into()))
    }
}

fn amount_catalog() -> RuleCatalog {
    RuleCatalog {
        rules: vec![
            BusinessRule::new(
                "POSITIVE_AMOUNT",
                "#amount != null && #amount > 0",
                QualityDimension::Accuracy,
                Severity::Critical,
            ),
            BusinessRule::new(
                "CURRENCY_REQUIRED",
                "#currency != null && !#currency.isBlank()",
                QualityDimension::Completeness,
                Severity::High,
            ),
        ],
        ..Default::default()
    }
}

fn exposure(id: &str, amount: f64, currency: &str) -> ExposureRecord {
    ExposureRecord {
        exposure_amount: Some(amount),
        currency: Some(currency.to_string()),
        ..ExposureRecord::new(id)
    }
}

/// A record that satisfies every rule of the shipped catalog.
fn clean_exposure(id: &str) -> ExposureRecord {
    ExposureRecord {
        counterparty_id: Some("CP-1".into()),
        exposure_amount: Some(1_000_000.0),
        currency: Some("EUR".into()),
        country_code: Some("DE".into()),
        sector: Some("CORPORATE".into()),
        counterparty_type: Some("CORPORATE".into()),
        product_type: Some("LOAN".into()),
        counterparty_lei: Some("529900T8BM49AURSDO55".into()),
        internal_rating: Some("A".into()),
        risk_weight: Some(1.0),
        reporting_date: Some(as_of() - Duration::days(5)),
        valuation_date: Some(as_of() - Duration::days(10)),
        maturity_date: Some(NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()),
        ..ExposureRecord::new(id)
    }
}

fn mixed_records(n: usize) -> Vec<ExposureRecord> {
    (0..n)
        .map(|i| match i % 7 {
            0 => exposure(&format!("E{i}"), -1.0, "EUR"),
            3 => exposure(&format!("E{i}"), 10.0, " "),
            _ => exposure(&format!("E{i}"), 10.0 + i as f64, "EUR"),
        })
        .collect()
}

// --- END-TO-END ---

#[tokio::test]
async fn test_default_catalog_end_to_end() -> anyhow::Result<()> {
    let engine = QualityEngine::new(
        Arc::new(YamlRuleStore::default_catalog()?),
        EngineConfig::default(),
    )?;

    let bad = ExposureRecord {
        exposure_amount: Some(-5.0),
        currency: Some("XXX".into()),
        reporting_date: Some(as_of() + Duration::days(3)),
        ..clean_exposure("EXP-2")
    };
    let batch = ExposureBatch::new("BATCH-1", vec![clean_exposure("EXP-1"), bad]);
    let result = engine.validate_as_of("BANK-1", batch, as_of()).await?;

    assert!(result.is_complete());
    let clean = result.record("EXP-1").unwrap();
    assert_eq!(clean.status, RecordStatus::Valid, "{:?}", clean.violations);
    assert!(clean.failures.is_empty());

    let bad = result.record("EXP-2").unwrap();
    assert_eq!(bad.status, RecordStatus::Invalid);
    let failed: Vec<&str> = bad.violations.iter().map(|v| v.rule_id.as_str()).collect();
    for expected in [
        "ACCURACY_POSITIVE_AMOUNT",
        "ACCURACY_VALID_CURRENCY",
        "TIMELINESS_NO_FUTURE_REPORTING_DATE",
    ] {
        assert!(failed.contains(&expected), "missing {expected} in {failed:?}");
    }

    assert_eq!(result.summary.valid_records, 1);
    assert_eq!(result.summary.invalid_records, 1);
    assert!(result.scores.overall_score < 100.0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_matches_sequential() -> anyhow::Result<()> {
    let records = mixed_records(1_500);

    let mut sequential = EngineConfig::default();
    sequential.validation.parallel_threshold = usize::MAX;
    let mut parallel = EngineConfig::default();
    parallel.validation.parallel_threshold = 10;
    parallel.validation.max_in_flight = 8;
    parallel.validation.chunk_size = 97;

    let seq = QualityEngine::new(CountingStore::new(amount_catalog()), sequential)?
        .validate_as_of("BANK", ExposureBatch::new("B", records.clone()), as_of())
        .await?;
    let par = QualityEngine::new(CountingStore::new(amount_catalog()), parallel)?
        .validate_as_of("BANK", ExposureBatch::new("B", records), as_of())
        .await?;

    assert_eq!(seq.records, par.records);
    assert_eq!(seq.summary, par.summary);
    assert_eq!(seq.scores, par.scores);
    assert_eq!(seq.summary.total_records, 1_500);
    Ok(())
}

// --- RULE SELECTION ---

#[tokio::test]
async fn test_rule_outside_window_is_ignored() -> anyhow::Result<()> {
    let mut catalog = amount_catalog();
    catalog.rules[0].effective_to = NaiveDate::from_ymd_opt(2020, 12, 31);
    let engine = QualityEngine::new(CountingStore::new(catalog), EngineConfig::default())?;

    let result = engine
        .validate_as_of(
            "BANK",
            ExposureBatch::new("B", vec![exposure("E1", -10.0, "EUR")]),
            as_of(),
        )
        .await?;

    let record = result.record("E1").unwrap();
    assert!(record.violations.is_empty());
    assert!(!record.evaluated_dimensions.contains(&QualityDimension::Accuracy));
    assert_eq!(record.status, RecordStatus::Valid);
    Ok(())
}

#[tokio::test]
async fn test_exemption_suppresses_violation() -> anyhow::Result<()> {
    let mut catalog = amount_catalog();
    catalog.exemptions.push(Exemption {
        rule_id: "POSITIVE_AMOUNT".into(),
        entity_id: "E2".into(),
        valid_from: NaiveDate::from_ymd_opt(2024, 1, 1),
        valid_to: NaiveDate::from_ymd_opt(2024, 12, 31),
        reason: Some("Netting agreement under review".into()),
    });
    let engine = QualityEngine::new(CountingStore::new(catalog), EngineConfig::default())?;

    let batch = ExposureBatch::new(
        "B",
        vec![exposure("E1", -1.0, "EUR"), exposure("E2", -1.0, "EUR")],
    );
    let result = engine.validate_as_of("BANK", batch, as_of()).await?;

    assert_eq!(result.record("E1").unwrap().status, RecordStatus::Invalid);
    let exempted = result.record("E2").unwrap();
    assert_eq!(exempted.status, RecordStatus::Valid);
    assert_eq!(exempted.exemptions.len(), 1);
    assert_eq!(result.summary.total_exemptions, 1);
    Ok(())
}

#[tokio::test]
async fn test_parameters_feed_expressions() -> anyhow::Result<()> {
    let mut catalog = amount_catalog();
    catalog.rules.push(BusinessRule::new(
        "CURRENCY_WHITELIST",
        "#currency.toUpperCase() in #allowed",
        QualityDimension::Validity,
        Severity::Medium,
    ));
    catalog.parameters.push(RuleParameter::new(
        "CURRENCY_WHITELIST",
        "allowed",
        "EUR, USD",
    ));
    let engine = QualityEngine::new(CountingStore::new(catalog), EngineConfig::default())?;

    let batch = ExposureBatch::new(
        "B",
        vec![exposure("E1", 1.0, "usd"), exposure("E2", 1.0, "CHF")],
    );
    let result = engine.validate_as_of("BANK", batch, as_of()).await?;

    assert!(result.record("E1").unwrap().passed());
    assert!(result.record("E2").unwrap().has_violation_in(QualityDimension::Validity));
    Ok(())
}

// --- FAILURE ISOLATION ---

#[tokio::test]
async fn test_malformed_rule_is_isolated() -> anyhow::Result<()> {
    let mut catalog = amount_catalog();
    catalog.rules.push(BusinessRule::new(
        "BROKEN",
        "#amount >",
        QualityDimension::Accuracy,
        Severity::Low,
    ));
    let engine = QualityEngine::new(CountingStore::new(catalog), EngineConfig::default())?;

    let batch = ExposureBatch::new(
        "B",
        vec![exposure("E1", 5.0, "EUR"), exposure("E2", -5.0, "EUR")],
    );
    let result = engine.validate_as_of("BANK", batch, as_of()).await?;

    assert_eq!(result.summary.total_failures, 2);
    assert!(result.failures().all(|f| f.rule_id == "BROKEN"));
    assert_eq!(result.record("E1").unwrap().status, RecordStatus::Valid);
    assert_eq!(result.record("E2").unwrap().status, RecordStatus::Invalid);
    Ok(())
}

#[tokio::test]
async fn test_rule_store_failure_is_fatal() -> anyhow::Result<()> {
    let store = CountingStore::new(amount_catalog());
    store.fail.store(true, Ordering::SeqCst);
    let engine = QualityEngine::new(store.clone(), EngineConfig::default())?;

    let err = engine
        .validate_as_of("BANK", ExposureBatch::new("B", mixed_records(3)), as_of())
        .await
        .unwrap_err();
    assert!(matches!(err, QualityError::RuleStoreLoad { ref batch_id, .. } if batch_id == "B"));

    // A failed load is not cached
    store.fail.store(false, Ordering::SeqCst);
    let result = engine
        .validate_as_of("BANK", ExposureBatch::new("B", mixed_records(3)), as_of())
        .await?;
    assert_eq!(result.summary.total_records, 3);
    assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_failing_audit_sink_does_not_change_results() -> anyhow::Result<()> {
    let records = mixed_records(40);
    let plain = QualityEngine::new(CountingStore::new(amount_catalog()), EngineConfig::default())?;
    let audited = QualityEngine::with_audit(
        CountingStore::new(amount_catalog()),
        Arc::new(FailingSink),
        EngineConfig::default(),
    )?;

    let expected = plain
        .validate_as_of("BANK", ExposureBatch::new("B", records.clone()), as_of())
        .await?;
    let actual = audited
        .validate_as_of("BANK", ExposureBatch::new("B", records), as_of())
        .await?;
    assert_eq!(expected.records, actual.records);

    let stats = audited.shutdown().await.unwrap();
    assert_eq!(stats.failed, 80);
    assert_eq!(stats.delivered, 0);
    Ok(())
}

#[tokio::test]
async fn test_deadline_yields_partial_result() -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    config.validation.batch_deadline_ms = Some(1);
    let engine = QualityEngine::new(CountingStore::slow(amount_catalog(), 30), config)?;

    let result = engine
        .validate_as_of("BANK", ExposureBatch::new("B", mixed_records(20)), as_of())
        .await?;

    assert_eq!(result.status, BatchStatus::Partial);
    assert_eq!(result.summary.not_evaluated_records, 20);
    assert!(result.violations().next().is_none());
    Ok(())
}

// --- CACHE ---

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_validations_share_one_load() -> anyhow::Result<()> {
    let store = CountingStore::slow(amount_catalog(), 50);
    let engine = Arc::new(QualityEngine::new(store.clone(), EngineConfig::default())?);
    let barrier = Arc::new(Barrier::new(50));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                engine
                    .validate_as_of("BANK", ExposureBatch::new("SHARED", mixed_records(10)), as_of())
                    .await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await??;
        assert_eq!(result.summary.total_records, 10);
    }
    assert_eq!(store.loads.load(Ordering::SeqCst), 1);

    // Slot released: the next batch reloads
    engine
        .validate_as_of("BANK", ExposureBatch::new("SHARED", mixed_records(1)), as_of())
        .await?;
    assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    Ok(())
}

// --- BATCH-LEVEL CHECKS & SCORING ---

#[tokio::test]
async fn test_consistency_checks_reported() -> anyhow::Result<()> {
    let engine = QualityEngine::new(CountingStore::new(amount_catalog()), EngineConfig::default())?;

    let mut first = exposure("E1", 1.0, "EUR");
    first.counterparty_lei = Some("LEI0000000000000001".into());
    first.counterparty_id = Some("CP-1".into());
    let mut second = exposure("E2", 1.0, "EUR");
    second.counterparty_lei = Some("LEI0000000000000001".into());
    second.counterparty_id = Some("CP-2".into());

    let batch = ExposureBatch::new("B", vec![first, second, exposure("E3", 1.0, "EUR")])
        .with_declared_count(5)
        .with_references(vec!["E1".into(), "E9".into()]);
    let result = engine.validate_as_of("BANK", batch, as_of()).await?;

    let consistency = &result.consistency;
    assert!(!consistency.passed);
    for kind in [
        ConsistencyCheckType::RecordCount,
        ConsistencyCheckType::ReferenceMapping,
        ConsistencyCheckType::IdentityMapping,
    ] {
        assert!(!consistency.check(kind).unwrap().passed, "{kind:?} should fail");
    }
    assert!(consistency.check(ConsistencyCheckType::DominantCurrency).unwrap().passed);

    let identity = consistency.check(ConsistencyCheckType::IdentityMapping).unwrap();
    assert_eq!(identity.violations[0].actual_value, "CP-1, CP-2");
    assert_eq!(result.summary.consistency_violations, 3);
    // Record-level rules are unaffected
    assert_eq!(result.summary.valid_records, 3);
    Ok(())
}

#[tokio::test]
async fn test_dimension_without_rules_scores_full() -> anyhow::Result<()> {
    let engine = QualityEngine::new(CountingStore::new(amount_catalog()), EngineConfig::default())?;
    let result = engine
        .validate_as_of("BANK", ExposureBatch::new("B", mixed_records(14)), as_of())
        .await?;

    assert_eq!(result.scores.dimension(QualityDimension::Timeliness), 100.0);
    assert!(result.scores.dimension(QualityDimension::Accuracy) < 100.0);
    assert!(result.scores.overall_score <= 100.0 && result.scores.overall_score >= 0.0);
    Ok(())
}

#[tokio::test]
async fn test_duplicates_are_keyed_and_flagged() -> anyhow::Result<()> {
    let engine = QualityEngine::new(CountingStore::new(amount_catalog()), EngineConfig::default())?;
    let batch = ExposureBatch::new(
        "B",
        vec![
            exposure("E1", 1.0, "EUR"),
            exposure("E1", 2.0, "EUR"),
            exposure("E3", 3.0, "EUR"),
        ],
    );
    let result = engine.validate_as_of("BANK", batch, as_of()).await?;

    assert!(result.record("E1").is_some());
    assert!(result.record("E1#1").is_some());
    assert_eq!(result.summary.duplicate_records, 2);
    assert!(result.scores.dimension(QualityDimension::Uniqueness) < 100.0);
    Ok(())
}

// --- CONFIGURATION ---

#[tokio::test]
async fn test_engine_from_config_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("quality_engine.yaml"),
        "validation:\n  max_in_flight: 2\n  parallel_threshold: 5\naudit:\n  enabled: false\n",
    )?;
    let config = load_engine_config(dir.path())?;
    let engine = QualityEngine::new(CountingStore::new(amount_catalog()), config)?;

    let result = engine
        .validate_as_of("BANK", ExposureBatch::new("B", mixed_records(12)), as_of())
        .await?;
    assert!(result.is_complete());
    assert_eq!(result.summary.total_records, 12);
    assert!(engine.shutdown().await.is_none());
    Ok(())
}
