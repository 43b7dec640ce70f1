// quality-core/src/infrastructure/rule_store.rs

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::domain::rules::{BusinessRule, Exemption, RuleParameter};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::rule_store::{RuleStore, RuleStoreError};

const DEFAULT_CATALOG: &str = include_str!("../../catalog/default_rules.yaml");

/// On-disk layout of a rule catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCatalog {
    #[serde(default)]
    pub rules: Vec<BusinessRule>,
    #[serde(default)]
    pub parameters: Vec<RuleParameter>,
    #[serde(default)]
    pub exemptions: Vec<Exemption>,
}

impl RuleCatalog {
    /// Structural checks: unique rule ids, non-empty expressions, no dangling references.
    pub fn check(&self) -> Result<(), InfrastructureError> {
        let mut ids = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(InfrastructureError::CatalogError(
                    "Rule with an empty id".to_string(),
                ));
            }
            if !ids.insert(rule.id.as_str()) {
                return Err(InfrastructureError::CatalogError(format!(
                    "Duplicate rule id '{}'",
                    rule.id
                )));
            }
            if rule.expression.trim().is_empty() {
                return Err(InfrastructureError::CatalogError(format!(
                    "Rule '{}' has an empty expression",
                    rule.id
                )));
            }
        }

        let mut parameter_names = HashSet::new();
        for parameter in &self.parameters {
            if !ids.contains(parameter.rule_id.as_str()) {
                return Err(InfrastructureError::CatalogError(format!(
                    "Parameter '{}' references unknown rule '{}'",
                    parameter.name, parameter.rule_id
                )));
            }
            if !parameter_names.insert((parameter.rule_id.as_str(), parameter.name.as_str())) {
                return Err(InfrastructureError::CatalogError(format!(
                    "Parameter '{}' declared twice for rule '{}'",
                    parameter.name, parameter.rule_id
                )));
            }
        }

        if let Some(orphan) = self
            .exemptions
            .iter()
            .find(|e| !ids.contains(e.rule_id.as_str()))
        {
            return Err(InfrastructureError::CatalogError(format!(
                "Exemption for '{}' references unknown rule '{}'",
                orphan.entity_id, orphan.rule_id
            )));
        }
        Ok(())
    }
}

/// Rule store backed by a YAML catalog held in memory.
#[derive(Debug, Clone)]
pub struct YamlRuleStore {
    catalog: RuleCatalog,
}

impl YamlRuleStore {
    pub fn from_catalog(catalog: RuleCatalog) -> Result<Self, InfrastructureError> {
        catalog.check()?;
        Ok(Self { catalog })
    }

    pub fn from_yaml(content: &str) -> Result<Self, InfrastructureError> {
        let catalog: RuleCatalog = serde_yaml::from_str(content)?;
        Self::from_catalog(catalog)
    }

    #[instrument]
    pub fn from_path(path: &Path) -> Result<Self, InfrastructureError> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule catalog at {:?}", path))?;
        let catalog: RuleCatalog = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse rule catalog YAML at {:?}", path))?;
        let store = Self::from_catalog(catalog)?;
        info!(
            rules = store.catalog.rules.len(),
            parameters = store.catalog.parameters.len(),
            exemptions = store.catalog.exemptions.len(),
            "Rule catalog loaded"
        );
        Ok(store)
    }

    /// The catalog shipped with the crate.
    pub fn default_catalog() -> Result<Self, InfrastructureError> {
        Self::from_yaml(DEFAULT_CATALOG)
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }
}

#[async_trait]
impl RuleStore for YamlRuleStore {
    async fn load_rules(
        &self,
        bank_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<BusinessRule>, RuleStoreError> {
        let rules: Vec<BusinessRule> = self
            .catalog
            .rules
            .iter()
            .filter(|r| r.enabled && r.applies_to_bank(bank_id) && r.is_effective_on(as_of))
            .cloned()
            .collect();
        debug!(bank_id, %as_of, count = rules.len(), "Catalog rules selected");
        Ok(rules)
    }

    async fn load_parameters(
        &self,
        rule_ids: &[String],
    ) -> Result<Vec<RuleParameter>, RuleStoreError> {
        Ok(self
            .catalog
            .parameters
            .iter()
            .filter(|p| rule_ids.contains(&p.rule_id))
            .cloned()
            .collect())
    }

    async fn load_exemptions(
        &self,
        rule_ids: &[String],
        as_of: NaiveDate,
    ) -> Result<Vec<Exemption>, RuleStoreError> {
        Ok(self
            .catalog
            .exemptions
            .iter()
            .filter(|e| rule_ids.contains(&e.rule_id) && e.covers(as_of))
            .cloned()
            .collect())
    }
}
