// quality-core/src/domain/context.rs

// Projection of an exposure into the named variables seen by rule expressions.
//
// Naming convention (absent fields are omitted, never defaulted):
//   exposureId, counterpartyId, amount, currency, country, sector, counterpartyType,
//   productType, leiCode, internalRating, riskCategory, riskWeight, reportingDate,
//   valuationDate, maturityDate, referenceNumber, collateralValue
// Always present:
//   isCorporateExposure, isTermExposure, entityType ("EXPOSURE")
// Present when the exposure has an id:
//   entityId

use crate::domain::expression::{Bindings, Value};
use crate::domain::record::ExposureRecord;
use crate::domain::rules::RuleParameter;
use std::collections::HashMap;

pub const ENTITY_TYPE: &str = "EXPOSURE";

/// Fields copied into audit events. Everything else stays out of the execution log.
pub const ESSENTIAL_FIELDS: [&str; 12] = [
    "entityType",
    "entityId",
    "exposureId",
    "counterpartyId",
    "amount",
    "currency",
    "country",
    "productType",
    "leiCode",
    "referenceNumber",
    "isCorporateExposure",
    "isTermExposure",
];

/// Variables by name, with a secondary lookup that ignores case and underscores
/// so `exposure_id`, `EXPOSUREID` and `exposureId` resolve to the same value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleContext {
    values: HashMap<String, Value>,
    aliases: HashMap<String, String>,
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl RuleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Null values are dropped: a missing field and a null field read the same.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        if value.is_null() {
            return;
        }
        let name = name.into();
        // First registration wins for a given normalized key
        self.aliases
            .entry(normalize(&name))
            .or_insert_with(|| name.clone());
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| {
            self.aliases
                .get(&normalize(name))
                .and_then(|canonical| self.values.get(canonical))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Rule parameters, converted to typed values.
    pub fn from_parameters<'p>(parameters: impl IntoIterator<Item = &'p RuleParameter>) -> Self {
        let mut context = Self::new();
        for parameter in parameters {
            context.insert(parameter.name.clone(), parameter.typed_value());
        }
        context
    }
}

impl Bindings for RuleContext {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Rule parameters layered over a record context. Parameters shadow record fields.
pub struct Scope<'a> {
    parameters: &'a RuleContext,
    record: &'a RuleContext,
}

impl<'a> Scope<'a> {
    pub fn new(parameters: &'a RuleContext, record: &'a RuleContext) -> Self {
        Self { parameters, record }
    }
}

impl Bindings for Scope<'_> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name).or_else(|| self.record.get(name))
    }
}

pub struct ContextBuilder;

impl ContextBuilder {
    pub fn build(record: &ExposureRecord) -> RuleContext {
        let mut ctx = RuleContext::new();

        put_text(&mut ctx, "exposureId", &record.exposure_id);
        put_text(&mut ctx, "counterpartyId", &record.counterparty_id);
        put_number(&mut ctx, "amount", record.exposure_amount);
        put_text(&mut ctx, "currency", &record.currency);
        put_text(&mut ctx, "country", &record.country_code);
        put_text(&mut ctx, "sector", &record.sector);
        put_text(&mut ctx, "counterpartyType", &record.counterparty_type);
        put_text(&mut ctx, "productType", &record.product_type);
        put_text(&mut ctx, "leiCode", &record.counterparty_lei);
        put_text(&mut ctx, "internalRating", &record.internal_rating);
        put_text(&mut ctx, "riskCategory", &record.risk_category);
        put_number(&mut ctx, "riskWeight", record.risk_weight);
        put_date(&mut ctx, "reportingDate", record.reporting_date);
        put_date(&mut ctx, "valuationDate", record.valuation_date);
        put_date(&mut ctx, "maturityDate", record.maturity_date);
        put_text(&mut ctx, "referenceNumber", &record.reference_number);
        put_number(&mut ctx, "collateralValue", record.collateral_value);

        ctx.insert("isCorporateExposure", Value::Bool(record.is_corporate_exposure()));
        ctx.insert("isTermExposure", Value::Bool(record.is_term_exposure()));
        ctx.insert("entityType", Value::from(ENTITY_TYPE));
        if let Some(id) = record.entity_id() {
            ctx.insert("entityId", Value::from(id));
        }

        ctx
    }
}

fn put_text(ctx: &mut RuleContext, name: &str, value: &Option<String>) {
    if let Some(v) = value {
        ctx.insert(name, Value::Text(v.clone()));
    }
}

fn put_number(ctx: &mut RuleContext, name: &str, value: Option<f64>) {
    if let Some(v) = value {
        ctx.insert(name, Value::Number(v));
    }
}

fn put_date(ctx: &mut RuleContext, name: &str, value: Option<chrono::NaiveDate>) {
    if let Some(v) = value {
        ctx.insert(name, Value::Date(v));
    }
}
