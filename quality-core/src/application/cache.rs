// quality-core/src/application/cache.rs

// Batch-scoped rule cache.
// One slot per batch identity, shared by every concurrent caller of that batch.
// The first caller loads from the store; the others await the same OnceCell.
// The slot is released when the last lease on it is dropped, so nothing outlives its batch.

use crate::domain::context::RuleContext;
use crate::domain::expression::{Expression, ExpressionError};
use crate::domain::rules::{BusinessRule, Exemption, RuleParameter};
use crate::ports::rule_store::{RuleStore, RuleStoreError};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub bank_id: String,
    pub batch_id: String,
    pub as_of: NaiveDate,
}

impl BatchKey {
    pub fn new(bank_id: impl Into<String>, batch_id: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            bank_id: bank_id.into(),
            batch_id: batch_id.into(),
            as_of,
        }
    }
}

/// A rule with its expression parsed once and its parameters already typed.
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: BusinessRule,
    /// Parse errors are kept: the rule is reported as Failed for each record.
    pub expression: Result<Expression, ExpressionError>,
    pub parameters: RuleContext,
}

/// Immutable once built. Shared read-only between workers.
#[derive(Debug)]
pub struct CachedRuleSet {
    pub key: BatchKey,
    rules: Vec<CompiledRule>,
    /// rule id -> entity id -> exemptions
    exemptions: HashMap<String, HashMap<String, Vec<Exemption>>>,
}

impl CachedRuleSet {
    pub fn build(
        key: BatchKey,
        rules: Vec<BusinessRule>,
        parameters: Vec<RuleParameter>,
        exemptions: Vec<Exemption>,
    ) -> Self {
        let mut params_by_rule: HashMap<String, Vec<RuleParameter>> = HashMap::new();
        for parameter in parameters {
            params_by_rule
                .entry(parameter.rule_id.clone())
                .or_default()
                .push(parameter);
        }

        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .map(|rule| {
                let expression = Expression::parse(&rule.expression);
                if let Err(e) = &expression {
                    warn!(
                        rule_id = %rule.id,
                        expression = %rule.expression,
                        error = %e,
                        "Rule expression does not compile, rule will be reported as failed"
                    );
                }
                let parameters = params_by_rule
                    .get(&rule.id)
                    .map(|p| RuleContext::from_parameters(p))
                    .unwrap_or_default();
                CompiledRule {
                    rule,
                    expression,
                    parameters,
                }
            })
            .collect();
        compiled.sort_by(|a, b| {
            a.rule
                .execution_order
                .cmp(&b.rule.execution_order)
                .then_with(|| a.rule.id.cmp(&b.rule.id))
        });

        let mut index: HashMap<String, HashMap<String, Vec<Exemption>>> = HashMap::new();
        for exemption in exemptions {
            index
                .entry(exemption.rule_id.clone())
                .or_default()
                .entry(exemption.entity_id.clone())
                .or_default()
                .push(exemption);
        }

        Self {
            key,
            rules: compiled,
            exemptions: index,
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.key.as_of
    }

    /// In execution order.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn rule(&self, rule_id: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.rule.id == rule_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn compile_failures(&self) -> usize {
        self.rules.iter().filter(|r| r.expression.is_err()).count()
    }

    /// Exemption of `entity_id` from `rule_id` that covers `date`, if any.
    pub fn exemption_for(&self, rule_id: &str, entity_id: &str, date: NaiveDate) -> Option<&Exemption> {
        self.exemptions
            .get(rule_id)?
            .get(entity_id)?
            .iter()
            .find(|e| e.covers(date))
    }
}

struct Slot {
    cell: Arc<OnceCell<Arc<CachedRuleSet>>>,
    leases: usize,
}

pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    slots: Mutex<HashMap<BatchKey, Slot>>,
}

/// Keeps a batch slot alive. Dropping the last lease of a batch evicts it.
pub struct BatchLease {
    cache: Arc<RuleCache>,
    key: BatchKey,
}

impl Drop for BatchLease {
    fn drop(&mut self) {
        let mut slots = self
            .cache
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.leases = slot.leases.saturating_sub(1);
            if slot.leases == 0 {
                slots.remove(&self.key);
                debug!(batch_id = %self.key.batch_id, "Rule cache slot released");
            }
        }
    }
}

impl RuleCache {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of batches currently holding a slot.
    pub fn active_batches(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Rule set of the batch, loaded at most once while any lease on it is alive.
    pub async fn for_batch(
        self: &Arc<Self>,
        key: &BatchKey,
    ) -> Result<(BatchLease, Arc<CachedRuleSet>), RuleStoreError> {
        let cell = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                cell: Arc::new(OnceCell::new()),
                leases: 0,
            });
            slot.leases += 1;
            slot.cell.clone()
        };
        // Taken before awaiting so a failed load still releases the slot
        let lease = BatchLease {
            cache: Arc::clone(self),
            key: key.clone(),
        };

        let rule_set = cell.get_or_try_init(|| self.load(key)).await?.clone();
        Ok((lease, rule_set))
    }

    #[instrument(skip(self), fields(bank_id = %key.bank_id, batch_id = %key.batch_id))]
    async fn load(&self, key: &BatchKey) -> Result<Arc<CachedRuleSet>, RuleStoreError> {
        let start = Instant::now();

        // 1. Rules (enabled, visible to the bank, effective on the as-of date)
        let rules: Vec<BusinessRule> = self
            .store
            .load_rules(&key.bank_id, key.as_of)
            .await?
            .into_iter()
            .filter(|r| r.enabled && r.applies_to_bank(&key.bank_id) && r.is_effective_on(key.as_of))
            .collect();
        let rule_ids: Vec<String> = rules.iter().map(|r| r.id.clone()).collect();

        // 2. Parameters and active exemptions of those rules only
        let (parameters, exemptions) = if rule_ids.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let parameters = self.store.load_parameters(&rule_ids).await?;
            let exemptions = self
                .store
                .load_exemptions(&rule_ids, key.as_of)
                .await?
                .into_iter()
                .filter(|e| e.covers(key.as_of))
                .collect();
            (parameters, exemptions)
        };

        let (parameter_count, exemption_count) = (parameters.len(), exemptions.len());
        let rule_set = CachedRuleSet::build(key.clone(), rules, parameters, exemptions);

        info!(
            rules = rule_set.len(),
            parameters = parameter_count,
            exemptions = exemption_count,
            compile_failures = rule_set.compile_failures(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Rule set loaded"
        );

        Ok(Arc::new(rule_set))
    }
}
