// quality-core/src/lib.rs

// 1. Mandatory documentation for production code
#![allow(missing_docs)]

// 2. Memory safety
#![deny(unsafe_code)]
// 3. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 4. Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (Interfaces / Traits)
// Contracts with the outside world: rule store (read-only) and audit sink (fire-and-forget).
pub mod ports;

// 2. Domain (business core)
// Records, rules, expression language, consistency / uniqueness checks, scoring.
// Depends on nothing else (neither infra nor app).
pub mod domain;

// 3. Infrastructure (Adapters)
// YAML rule catalog, configuration loading.
pub mod infrastructure;

// 4. Application (Use Cases)
// Rule cache, executor, parallel coordinator, engine facade.
pub mod application;

// --- GLOBAL ERROR HANDLING ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use application::{ExposureBatch, QualityEngine};
pub use domain::validation::ValidationBatchResult;
pub use error::QualityError;
