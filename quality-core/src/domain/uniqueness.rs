// quality-core/src/domain/uniqueness.rs

use crate::domain::record::ExposureRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateKind {
    ExposureId,
    ReferenceNumber,
    /// Same business content under different identifiers.
    Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub kind: DuplicateKind,
    pub key: String,
    /// Positions in the batch, ascending.
    pub record_indices: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniquenessReport {
    pub groups: Vec<DuplicateGroup>,
    flagged: BTreeSet<usize>,
}

impl UniquenessReport {
    pub fn is_flagged(&self, index: usize) -> bool {
        self.flagged.contains(&index)
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged.len()
    }
}

pub struct UniquenessChecker;

impl UniquenessChecker {
    /// Every member of a duplicate group is flagged, not only the later ones.
    pub fn check(records: &[ExposureRecord]) -> UniquenessReport {
        let mut by_id: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_reference: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_content: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, record) in records.iter().enumerate() {
            if let Some(id) = record.entity_id() {
                by_id.entry(id).or_default().push(index);
            }
            if let Some(reference) = record
                .reference_number
                .as_deref()
                .filter(|r| !r.trim().is_empty())
            {
                by_reference.entry(reference).or_default().push(index);
            }
            if let Some(hash) = Self::content_hash(record) {
                by_content.entry(hash).or_default().push(index);
            }
        }

        let mut groups = Vec::new();
        push_groups(&mut groups, DuplicateKind::ExposureId, by_id);
        push_groups(&mut groups, DuplicateKind::ReferenceNumber, by_reference);
        push_groups(&mut groups, DuplicateKind::Content, by_content);
        groups.sort_by(|a, b| {
            a.record_indices
                .first()
                .cmp(&b.record_indices.first())
                .then_with(|| a.key.cmp(&b.key))
        });

        let flagged = groups
            .iter()
            .flat_map(|g| g.record_indices.iter().copied())
            .collect();

        UniquenessReport { groups, flagged }
    }

    /// SHA-256 over the significant fields, identifiers excluded.
    /// `None` when the record carries no content at all.
    pub fn content_hash(record: &ExposureRecord) -> Option<String> {
        let fields = [
            record.counterparty_id.clone(),
            record.exposure_amount.map(|v| v.to_string()),
            record.currency.clone(),
            record.country_code.clone(),
            record.sector.clone(),
            record.counterparty_type.clone(),
            record.product_type.clone(),
            record.counterparty_lei.clone(),
            record.internal_rating.clone(),
            record.risk_category.clone(),
            record.risk_weight.map(|v| v.to_string()),
            record.reporting_date.map(|d| d.to_string()),
            record.valuation_date.map(|d| d.to_string()),
            record.maturity_date.map(|d| d.to_string()),
            record.collateral_value.map(|v| v.to_string()),
        ];
        if fields.iter().all(Option::is_none) {
            return None;
        }

        // Presence marker + length prefix per field: no separator can collide
        let mut hasher = Sha256::new();
        for field in &fields {
            match field {
                None => hasher.update([0u8]),
                Some(value) => {
                    hasher.update([1u8]);
                    hasher.update((value.len() as u64).to_le_bytes());
                    hasher.update(value.as_bytes());
                }
            }
        }
        Some(format!("{:x}", hasher.finalize()))
    }
}

fn push_groups<K: ToString>(
    groups: &mut Vec<DuplicateGroup>,
    kind: DuplicateKind,
    buckets: HashMap<K, Vec<usize>>,
) {
    groups.extend(
        buckets
            .into_iter()
            .filter(|(_, indices)| indices.len() > 1)
            .map(|(key, record_indices)| DuplicateGroup {
                kind,
                key: key.to_string(),
                record_indices,
            }),
    );
}
