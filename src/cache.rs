//! Content-addressed cache of insight bundles.

use std::collections::{HashMap, VecDeque};

use log::debug;
use sha2::{Digest, Sha256};

use crate::{
    dataset::RawTable,
    filter::ActiveFilters,
    insights::{InsightBundle, InsightRegistry},
    mapping::{ColumnMapping, Role},
};

const NULL_MARKER: &[u8] = b"\x00null";
const FIELD_SEPARATOR: &[u8] = b"\x1f";
const RECORD_SEPARATOR: &[u8] = b"\x1e";

/// SHA-256 (hex) over the table contents, the mapping and the active filters.
/// Equal inputs always hash equal; any change to a cell, a mapped role or a
/// filter changes the signature.
pub fn signature(table: &RawTable, mapping: &ColumnMapping, filters: &ActiveFilters) -> String {
    let mut hasher = Sha256::new();
    for column in table.columns() {
        hasher.update(column.as_bytes());
        hasher.update(FIELD_SEPARATOR);
    }
    hasher.update(RECORD_SEPARATOR);
    for row in table.rows() {
        for cell in row {
            match cell {
                Some(value) => hasher.update(value.as_display().as_bytes()),
                None => hasher.update(NULL_MARKER),
            }
            hasher.update(FIELD_SEPARATOR);
        }
        hasher.update(RECORD_SEPARATOR);
    }
    for role in Role::ALL {
        hasher.update(role.as_str().as_bytes());
        hasher.update(b"=");
        match mapping.get(role) {
            Some(column) => hasher.update(column.as_bytes()),
            None => hasher.update(NULL_MARKER),
        }
        hasher.update(FIELD_SEPARATOR);
    }
    hasher.update(RECORD_SEPARATOR);
    for line in filters.describe() {
        hasher.update(line.as_bytes());
        hasher.update(FIELD_SEPARATOR);
    }
    hex::encode(hasher.finalize())
}

/// Bounded map from signature to bundle with first-in first-out eviction.
#[derive(Debug, Clone)]
pub struct InsightCache {
    capacity: usize,
    entries: HashMap<String, InsightBundle>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl InsightCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn get(&self, signature: &str) -> Option<&InsightBundle> {
        self.entries.get(signature)
    }

    pub fn insert(&mut self, signature: String, bundle: InsightBundle) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(signature.clone(), bundle).is_some() {
            return;
        }
        self.order.push_back(signature);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                debug!("Evicting cached insights {evicted}");
                self.entries.remove(&evicted);
            }
        }
    }

    /// Returns the cached bundle for `signature`, running `registry` only on
    /// a miss.
    pub fn get_or_compute(
        &mut self,
        signature: &str,
        registry: &InsightRegistry,
        table: &RawTable,
        mapping: &ColumnMapping,
    ) -> InsightBundle {
        if let Some(bundle) = self.entries.get(signature) {
            self.hits += 1;
            debug!("Insight cache hit for {signature}");
            return bundle.clone();
        }
        self.misses += 1;
        debug!("Insight cache miss for {signature}");
        let bundle = registry.run_all(table, mapping);
        self.insert(signature.to_string(), bundle.clone());
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(amount: &str) -> RawTable {
        RawTable::from_text_rows(["amount"], vec![vec![amount]]).unwrap()
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            amount: Some("amount".into()),
            ..ColumnMapping::default()
        }
    }

    #[test]
    fn signature_tracks_cells_mapping_and_filters() {
        let base = signature(&table("10"), &mapping(), &ActiveFilters::default());
        assert_eq!(base.len(), 64);
        assert_eq!(base, signature(&table("10"), &mapping(), &ActiveFilters::default()));
        assert_ne!(base, signature(&table("11"), &mapping(), &ActiveFilters::default()));
        assert_ne!(
            base,
            signature(&table("10"), &ColumnMapping::default(), &ActiveFilters::default())
        );
        let filters = ActiveFilters {
            products: vec!["Widget".into()],
            ..ActiveFilters::default()
        };
        assert_ne!(base, signature(&table("10"), &mapping(), &filters));
    }

    #[test]
    fn null_cells_hash_differently_from_text() {
        let nulls = RawTable::from_text_rows(["a"], vec![vec![""]]).unwrap();
        let text = RawTable::from_text_rows(["a"], vec![vec!["null-ish"]]).unwrap();
        assert_ne!(
            signature(&nulls, &mapping(), &ActiveFilters::default()),
            signature(&text, &mapping(), &ActiveFilters::default())
        );
    }

    #[test]
    fn get_or_compute_counts_hits_and_misses() {
        let registry = InsightRegistry::new();
        let table = table("10");
        let mut cache = InsightCache::new(4);
        let first = cache.get_or_compute("abc", &registry, &table, &mapping());
        let second = cache.get_or_compute("abc", &registry, &table, &mapping());
        assert_eq!(first, second);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn evicts_oldest_entry_first() {
        let registry = InsightRegistry::new();
        let table = table("1");
        let mut cache = InsightCache::new(2);
        for key in ["a", "b", "c"] {
            cache.get_or_compute(key, &registry, &table, &mapping());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }
}
