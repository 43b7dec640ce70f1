// quality-core/src/ports/rule_store.rs

// Read-only contract with whatever persists rule definitions (database, YAML catalog...).
// The engine never writes rules: it queries once per batch and freezes the result.

use crate::domain::rules::{BusinessRule, Exemption, RuleParameter};
use async_trait::async_trait;
use chrono::NaiveDate;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum RuleStoreError {
    #[error("Rule store unavailable: {0}")]
    #[diagnostic(
        code(quality::rule_store::unavailable),
        help("Check connectivity to the rule repository.")
    )]
    Unavailable(String),

    #[error("Rule store query '{query}' failed: {message}")]
    #[diagnostic(code(quality::rule_store::query))]
    Query { query: String, message: String },
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Enabled rules visible to `bank_id` on `as_of`.
    async fn load_rules(
        &self,
        bank_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<BusinessRule>, RuleStoreError>;

    async fn load_parameters(&self, rule_ids: &[String])
    -> Result<Vec<RuleParameter>, RuleStoreError>;

    /// Exemptions attached to `rule_ids` that are active on `as_of`.
    async fn load_exemptions(
        &self,
        rule_ids: &[String],
        as_of: NaiveDate,
    ) -> Result<Vec<Exemption>, RuleStoreError>;
}
