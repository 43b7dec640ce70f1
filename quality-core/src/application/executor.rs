// quality-core/src/application/executor.rs

use crate::application::audit::{AuditPublisher, sanitize_context};
use crate::application::cache::{CachedRuleSet, CompiledRule};
use crate::domain::context::{ContextBuilder, RuleContext, Scope};
use crate::domain::error::DomainError;
use crate::domain::expression::EvalEnv;
use crate::domain::record::ExposureRecord;
use crate::domain::rules::{ExecutionOutcome, ExemptionReason, RuleFailure, RuleViolation};
use crate::domain::validation::RecordResult;
use crate::ports::audit::{AuditEvent, AuditOutcome};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Applies rules to records. Holds no per-record state, so one instance serves every worker.
pub struct RuleExecutor {
    audit: AuditPublisher,
    slow_rule: Duration,
}

impl RuleExecutor {
    pub fn new(audit: AuditPublisher, slow_rule: Duration) -> Self {
        Self { audit, slow_rule }
    }

    /// One rule, one record.
    /// 1. outside the effective window -> Exempted (inapplicable)
    /// 2. active waiver for (rule, entity) -> Exempted
    /// 3. evaluate with parameters layered over the record context
    /// 4. true -> Passed, false -> Violated, error -> Failed
    pub fn execute(
        &self,
        compiled: &CompiledRule,
        rule_set: &CachedRuleSet,
        context: &RuleContext,
        record: &ExposureRecord,
        record_id: &str,
    ) -> ExecutionOutcome {
        let rule = &compiled.rule;
        let as_of = rule_set.as_of();
        let start = Instant::now();

        let outcome = if !rule.is_effective_on(as_of) {
            ExecutionOutcome::Exempted {
                reason: ExemptionReason::OutsideEffectiveWindow,
            }
        } else if record
            .entity_id()
            .is_some_and(|entity| rule_set.exemption_for(&rule.id, entity, as_of).is_some())
        {
            ExecutionOutcome::Exempted {
                reason: ExemptionReason::Waiver,
            }
        } else {
            self.evaluate(compiled, as_of, context, record_id)
        };

        let elapsed = start.elapsed();
        if elapsed > self.slow_rule {
            warn!(
                rule_id = %rule.id,
                record_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow rule evaluation"
            );
        }

        if self.audit.is_enabled() {
            self.audit.publish(audit_event(
                rule_set,
                &rule.id,
                record_id,
                &outcome,
                elapsed,
                context,
            ));
        }

        outcome
    }

    fn evaluate(
        &self,
        compiled: &CompiledRule,
        as_of: chrono::NaiveDate,
        context: &RuleContext,
        record_id: &str,
    ) -> ExecutionOutcome {
        let rule = &compiled.rule;
        let env = EvalEnv::new(as_of);
        let scope = Scope::new(&compiled.parameters, context);

        let result = match &compiled.expression {
            Ok(expression) => expression.evaluate_bool(&scope, &env),
            Err(parse_error) => Err(parse_error.clone()),
        };

        match result {
            Ok(true) => ExecutionOutcome::Passed,
            Ok(false) => ExecutionOutcome::Violated(RuleViolation::from_rule(rule, record_id)),
            Err(source) => {
                let error = DomainError::RuleExecution {
                    rule_id: rule.id.clone(),
                    expression: rule.expression.clone(),
                    source,
                };
                debug!(record_id, error = %error, "Rule execution failed, skipping for this record");
                ExecutionOutcome::Failed(RuleFailure {
                    rule_id: rule.id.clone(),
                    dimension: rule.dimension,
                    expression: rule.expression.clone(),
                    message: error.to_string(),
                })
            }
        }
    }

    /// Every rule of the set against one record, in execution order.
    pub fn execute_all(
        &self,
        rule_set: &CachedRuleSet,
        record: &ExposureRecord,
        record_id: &str,
        position: usize,
    ) -> RecordResult {
        let context = ContextBuilder::build(record);
        let mut result = RecordResult::new(record_id, position);
        for compiled in rule_set.rules() {
            let outcome = self.execute(compiled, rule_set, &context, record, record_id);
            result.record(&compiled.rule, outcome);
        }
        result
    }
}

fn audit_event(
    rule_set: &CachedRuleSet,
    rule_id: &str,
    record_id: &str,
    outcome: &ExecutionOutcome,
    elapsed: Duration,
    context: &RuleContext,
) -> AuditEvent {
    let (outcome, error) = match outcome {
        ExecutionOutcome::Passed => (AuditOutcome::Passed, None),
        ExecutionOutcome::Violated(_) => (AuditOutcome::Violated, None),
        ExecutionOutcome::Exempted {
            reason: ExemptionReason::Waiver,
        } => (AuditOutcome::Exempted, None),
        ExecutionOutcome::Exempted {
            reason: ExemptionReason::OutsideEffectiveWindow,
        } => (AuditOutcome::Inapplicable, None),
        ExecutionOutcome::Failed(failure) => (AuditOutcome::Failed, Some(failure.message.clone())),
    };
    AuditEvent {
        batch_id: rule_set.key.batch_id.clone(),
        rule_id: rule_id.to_string(),
        record_id: record_id.to_string(),
        outcome,
        duration_micros: elapsed.as_micros() as u64,
        error,
        recorded_at: chrono::Utc::now(),
        context: sanitize_context(context),
    }
}
