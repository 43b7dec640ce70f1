// quality-core/src/application/audit.rs

// Execution log plumbing: the executor enqueues, a background task drains into the sink.
// A full queue or a failing sink costs audit events, never validation results.

use crate::domain::context::{ESSENTIAL_FIELDS, RuleContext};
use crate::ports::audit::{AuditEvent, AuditSink};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> AuditStats {
        AuditStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Non-blocking handle used on the validation path.
#[derive(Clone, Debug)]
pub struct AuditPublisher {
    sender: Option<mpsc::Sender<AuditEvent>>,
    counters: Arc<Counters>,
}

impl AuditPublisher {
    /// A publisher that discards everything (audit switched off).
    pub fn disabled() -> Self {
        Self {
            sender: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Never waits: if the queue is full or closed the event is dropped and counted.
    pub fn publish(&self, event: AuditEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(event) {
            let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            // One line per thousand drops is enough
            if dropped % 1000 == 1 {
                warn!(dropped, reason = %e, "Audit queue saturated, dropping execution logs");
            }
        }
    }
}

pub struct AuditDispatcher {
    publisher: AuditPublisher,
    worker: JoinHandle<()>,
}

impl AuditDispatcher {
    /// Spawns the drain task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker_counters = counters.clone();
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match sink.record_execution(&event).await {
                    Ok(()) => {
                        worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            rule_id = %event.rule_id,
                            record_id = %event.record_id,
                            error = %e,
                            "Audit sink rejected execution log"
                        );
                    }
                }
            }
        });

        Self {
            publisher: AuditPublisher {
                sender: Some(sender),
                counters,
            },
            worker,
        }
    }

    pub fn publisher(&self) -> AuditPublisher {
        self.publisher.clone()
    }

    pub fn stats(&self) -> AuditStats {
        self.publisher.counters.snapshot()
    }

    /// Closes the queue and waits until pending events are drained.
    /// Every other publisher clone must have been dropped, otherwise this waits for them.
    pub async fn shutdown(self) -> AuditStats {
        let AuditDispatcher { publisher, worker } = self;
        let counters = publisher.counters.clone();
        drop(publisher);
        if let Err(e) = worker.await {
            warn!(error = %e, "Audit drain task ended abnormally");
        }
        counters.snapshot()
    }
}

/// Audit copy of a context: identifiers and a few key fields only.
pub fn sanitize_context(context: &RuleContext) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for field in ESSENTIAL_FIELDS {
        if let Some(value) = context.get(field)
            && let Ok(json) = serde_json::to_value(value)
        {
            map.insert(field.to_string(), json);
        }
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::context::ContextBuilder;
    use crate::domain::record::ExposureRecord;
    use crate::ports::audit::{AuditError, AuditOutcome};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MemorySink {
        events: Arc<Mutex<Vec<AuditEvent>>>,
        fail: bool,
    }

    #[async_trait]
    impl AuditSink for MemorySink {
        async fn record_execution(&self, event: &AuditEvent) -> Result<(), AuditError> {
            if self.fail {
                return Err(AuditError("disk full".into()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event(rule_id: &str) -> AuditEvent {
        AuditEvent {
            batch_id: "B1".into(),
            rule_id: rule_id.into(),
            record_id: "E1".into(),
            outcome: AuditOutcome::Passed,
            duration_micros: 3,
            error: None,
            recorded_at: chrono::Utc::now(),
            context: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_events_are_drained_on_shutdown() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AuditDispatcher::spawn(
            Arc::new(MemorySink {
                events: events.clone(),
                fail: false,
            }),
            16,
        );

        let publisher = dispatcher.publisher();
        publisher.publish(event("R1"));
        publisher.publish(event("R2"));
        drop(publisher);

        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.delivered, 2);
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_sink_is_counted_not_raised() {
        let dispatcher = AuditDispatcher::spawn(
            Arc::new(MemorySink {
                events: Arc::new(Mutex::new(Vec::new())),
                fail: true,
            }),
            16,
        );
        dispatcher.publisher().publish(event("R1"));

        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        // current_thread runtime: the drain task cannot run while we publish
        let dispatcher = AuditDispatcher::spawn(
            Arc::new(MemorySink {
                events: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }),
            2,
        );
        let publisher = dispatcher.publisher();
        for i in 0..5 {
            publisher.publish(event(&format!("R{i}")));
        }
        drop(publisher);

        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.delivered, 2);
    }

    #[test]
    fn test_disabled_publisher_ignores_events() {
        let publisher = AuditPublisher::disabled();
        assert!(!publisher.is_enabled());
        publisher.publish(event("R1"));
        assert_eq!(publisher.counters.snapshot(), AuditStats::default());
    }

    #[test]
    fn test_sanitized_context_keeps_essentials_only() {
        let record = ExposureRecord {
            exposure_id: Some("E1".into()),
            currency: Some("EUR".into()),
            internal_rating: Some("BBB".into()),
            ..Default::default()
        };
        let json = sanitize_context(&ContextBuilder::build(&record));
        assert_eq!(json["exposureId"], "E1");
        assert_eq!(json["currency"], "EUR");
        assert_eq!(json["entityType"], "EXPOSURE");
        assert!(json.get("internalRating").is_none());
    }
}
