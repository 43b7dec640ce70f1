// quality-core/src/application/coordinator.rs

// Fans a batch out over a bounded pool of blocking workers.
// Records are split in contiguous chunks, at most `max_in_flight` chunks run at once.
// Each worker only reads its own records and the shared immutable rule set, so the
// result does not depend on the degree of parallelism.

use crate::application::cache::CachedRuleSet;
use crate::application::executor::RuleExecutor;
use crate::domain::configuration::ValidationConfig;
use crate::domain::record::ExposureRecord;
use crate::domain::validation::{RecordResult, record_key};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

pub struct CoordinatorOutput {
    pub results: BTreeMap<String, RecordResult>,
    /// False when at least one record was not evaluated.
    pub complete: bool,
}

pub struct ValidationCoordinator {
    executor: Arc<RuleExecutor>,
    config: ValidationConfig,
}

/// Result keys, assigned up front so every run of the same batch uses the same ones.
pub fn assign_keys(records: &[ExposureRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .enumerate()
        .map(|(position, record)| record_key(record.exposure_id.as_deref(), position, &mut seen))
        .collect()
}

impl ValidationCoordinator {
    pub fn new(executor: Arc<RuleExecutor>, config: ValidationConfig) -> Self {
        Self { executor, config }
    }

    pub fn chunks(&self, total: usize) -> Vec<Range<usize>> {
        let size = self.config.chunk_size_for(total);
        (0..total)
            .step_by(size)
            .map(|start| start..(start + size).min(total))
            .collect()
    }

    pub async fn validate_all(
        &self,
        records: Arc<Vec<ExposureRecord>>,
        rule_set: Arc<CachedRuleSet>,
        deadline: Option<Instant>,
    ) -> CoordinatorOutput {
        let keys = Arc::new(assign_keys(&records));
        let chunks = self.chunks(records.len());
        let max_in_flight = self.config.effective_max_in_flight();
        debug!(
            records = records.len(),
            chunks = chunks.len(),
            max_in_flight,
            "Dispatching validation chunks"
        );

        let tasks = chunks.into_iter().map(|range| {
            let executor = self.executor.clone();
            let rule_set = rule_set.clone();
            let records = records.clone();
            let keys = keys.clone();
            let chunk = range.clone();
            async move {
                let joined = tokio::task::spawn_blocking(move || {
                    let expired = || deadline.is_some_and(|d| Instant::now() >= d);
                    process_chunk(&executor, &rule_set, &records, &keys, chunk, expired)
                })
                .await;
                (range, joined)
            }
        });

        let mut results = BTreeMap::new();
        let mut stream = futures::stream::iter(tasks).buffer_unordered(max_in_flight);
        while let Some((range, joined)) = stream.next().await {
            match joined {
                Ok(chunk) => {
                    for result in chunk {
                        results.insert(result.record_id.clone(), result);
                    }
                }
                Err(e) => {
                    // A panicking worker loses its chunk, not the batch
                    error!(error = %e, start = range.start, end = range.end, "Validation worker failed");
                    for position in range {
                        let key = keys[position].clone();
                        results.insert(key.clone(), RecordResult::not_evaluated(key, position));
                    }
                }
            }
        }

        let not_evaluated = results.values().filter(|r| !r.is_evaluated()).count();
        if not_evaluated > 0 {
            warn!(not_evaluated, "Batch validation incomplete");
        }

        CoordinatorOutput {
            results,
            complete: not_evaluated == 0,
        }
    }
}

fn process_chunk(
    executor: &RuleExecutor,
    rule_set: &CachedRuleSet,
    records: &[ExposureRecord],
    keys: &[String],
    range: Range<usize>,
    expired: impl Fn() -> bool,
) -> Vec<RecordResult> {
    // Checked before each record: finished results are kept, the rest is not evaluated
    range
        .map(|position| {
            let key = &keys[position];
            if expired() {
                RecordResult::not_evaluated(key.clone(), position)
            } else {
                executor.execute_all(rule_set, &records[position], key, position)
            }
        })
        .collect()
}
