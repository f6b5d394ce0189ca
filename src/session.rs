//! One loaded dataset and its confirmed mapping, analysed repeatedly under
//! different filters.

use anyhow::Result;
use log::{debug, info};

use crate::{
    cache::{InsightCache, signature},
    dataset::RawTable,
    filter::{ActiveFilters, FilterSet},
    insights::{InsightBundle, InsightRegistry},
    mapping::{ColumnMapping, Industry},
};

#[derive(Debug, Clone)]
pub struct Analysis {
    pub table: RawTable,
    pub mapping: ColumnMapping,
    pub filters: ActiveFilters,
    pub signature: String,
    pub bundle: InsightBundle,
}

#[derive(Debug)]
pub struct AnalysisSession {
    table: RawTable,
    mapping: ColumnMapping,
    industry: Industry,
    registry: InsightRegistry,
    cache: InsightCache,
}

impl AnalysisSession {
    pub fn new(
        table: RawTable,
        mapping: ColumnMapping,
        industry: Industry,
        cache_capacity: usize,
    ) -> Self {
        for (role, column) in mapping.dangling(&table) {
            debug!("Mapped {role} column '{column}' is not present in the dataset");
        }
        Self {
            table,
            mapping,
            industry,
            registry: InsightRegistry::new(),
            cache: InsightCache::new(cache_capacity),
        }
    }

    pub fn table(&self) -> &RawTable {
        &self.table
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn industry(&self) -> Industry {
        self.industry
    }

    pub fn cache(&self) -> &InsightCache {
        &self.cache
    }

    /// Replaces the confirmed mapping. Cached bundles stay valid because the
    /// mapping is part of every signature.
    pub fn set_mapping(&mut self, mapping: ColumnMapping) {
        self.mapping = mapping;
    }

    pub fn analyze(&mut self, filters: &FilterSet) -> Result<Analysis> {
        let (table, active) = filters.apply(&self.table, &self.mapping)?;
        let signature = signature(&table, &self.mapping, &active);
        debug!("Analysis signature {signature}");
        let bundle = self
            .cache
            .get_or_compute(&signature, &self.registry, &table, &self.mapping);
        info!(
            "Computed {} insight(s) over {} row(s), {} unavailable",
            bundle.len(),
            table.row_count(),
            bundle.failures().count()
        );
        Ok(Analysis {
            table,
            mapping: self.mapping.clone(),
            filters: active,
            signature,
            bundle,
        })
    }
}
