pub mod audit;
pub mod cache;
pub mod coordinator;
pub mod engine;
pub mod executor;

pub use audit::{AuditDispatcher, AuditPublisher, AuditStats};
pub use cache::{BatchKey, CachedRuleSet, RuleCache};
pub use coordinator::ValidationCoordinator;
pub use engine::{ExposureBatch, QualityEngine};
pub use executor::RuleExecutor;
