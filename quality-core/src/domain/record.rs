// quality-core/src/domain/record.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One exposure of an ingested batch. Every field is optional: the quality rules exist
/// precisely to report which ones are missing or wrong.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureRecord {
    pub exposure_id: Option<String>,
    pub counterparty_id: Option<String>,
    pub exposure_amount: Option<f64>,
    pub currency: Option<String>,
    pub country_code: Option<String>,
    pub sector: Option<String>,
    pub counterparty_type: Option<String>,
    pub product_type: Option<String>,
    pub counterparty_lei: Option<String>,
    pub internal_rating: Option<String>,
    pub risk_category: Option<String>,
    pub risk_weight: Option<f64>,
    pub reporting_date: Option<NaiveDate>,
    pub valuation_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub reference_number: Option<String>,
    pub collateral_value: Option<f64>,
}

impl ExposureRecord {
    pub fn new(exposure_id: impl Into<String>) -> Self {
        Self {
            exposure_id: Some(exposure_id.into()),
            ..Default::default()
        }
    }

    /// Corporate sectors are prefixed `CORPORATE`; banks are treated as corporates too.
    pub fn is_corporate_exposure(&self) -> bool {
        self.sector.as_deref().is_some_and(|s| {
            let s = s.trim().to_ascii_uppercase();
            s.starts_with("CORPORATE") || s == "BANKING"
        })
    }

    /// Everything except equity carries a maturity.
    pub fn is_term_exposure(&self) -> bool {
        !self
            .product_type
            .as_deref()
            .is_some_and(|p| p.trim().eq_ignore_ascii_case("EQUITY"))
    }

    pub fn has_required_fields(&self) -> bool {
        non_blank(&self.exposure_id)
            && self.exposure_amount.is_some()
            && non_blank(&self.currency)
            && non_blank(&self.country_code)
            && non_blank(&self.sector)
    }

    /// Identifier used for exemptions and audit events.
    pub fn entity_id(&self) -> Option<&str> {
        self.exposure_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
