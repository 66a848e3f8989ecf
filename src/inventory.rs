//! The source aggregator.
//!
//! [`InventorySet`] holds every configured source in config order and
//! presents them as one inventory. It does not deduplicate across
//! sources: the same host reported by two sources yields two instances,
//! distinguished by their `source` label.
//!
//! Sources can be narrowed with a glob over their configured names
//! (`hostbridge list --source 'prod*'`); unnamed sources match by type.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use hostbridge_core::{Instance, MatchOptions};

use crate::config::{InventoryConfig, SourceConfig};
use crate::source_aws::AwsInventory;
use crate::source_csv::CsvInventory;
use crate::source_ecs::EcsInventory;
use crate::source_newrelic::NewRelicInventory;
use crate::traits::{InventorySource, UpdateOutcome};

/// Construct the source described by one `[[inventory.sources]]` entry.
pub fn build_source(config: &InventoryConfig, source: &SourceConfig) -> Box<dyn InventorySource> {
    let dir = config.source_dir(source);
    let proxies = config.proxies();
    match source {
        SourceConfig::Aws(c) => Box::new(AwsInventory::new(c, &dir, proxies)),
        SourceConfig::Ecs(c) => Box::new(EcsInventory::new(c, &dir, proxies)),
        SourceConfig::Csv(c) => Box::new(CsvInventory::new(c, &dir)),
        SourceConfig::Newrelic(c) => Box::new(NewRelicInventory::new(c, &dir, proxies)),
    }
}

/// Result of updating one source.
#[derive(Debug)]
pub struct SourceUpdate {
    pub label: String,
    pub result: Result<UpdateOutcome, String>,
}

/// Per-source results of [`InventorySet::update`], in source order.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub entries: Vec<SourceUpdate>,
}

impl UpdateReport {
    pub fn failures(&self) -> impl Iterator<Item = &SourceUpdate> {
        self.entries.iter().filter(|e| e.result.is_err())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Ordered collection of inventory sources.
#[derive(Default)]
pub struct InventorySet {
    sources: Vec<Box<dyn InventorySource>>,
}

impl InventorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One source per configured entry, in config order.
    pub fn from_config(config: &InventoryConfig) -> Self {
        let mut set = Self::new();
        for source in &config.sources {
            set.add(build_source(config, source));
        }
        set
    }

    pub fn add(&mut self, source: Box<dyn InventorySource>) {
        tracing::debug!(source = %source.source_label(), "inventory source added");
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn InventorySource> {
        self.sources.get(index).map(|s| s.as_ref())
    }

    pub fn sources(&self) -> impl Iterator<Item = &dyn InventorySource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    /// Positions of the sources whose name (or type, when unnamed) matches
    /// `filter_sources`. `None` selects every source.
    pub fn select_indices(&self, filter_sources: Option<&str>) -> Result<Vec<usize>> {
        let matcher = filter_sources.map(compile_glob).transpose()?;
        Ok(self
            .sources()
            .enumerate()
            .filter(|(_, s)| match &matcher {
                Some(m) => m.is_match(s.name().unwrap_or(s.source_type())),
                None => true,
            })
            .map(|(i, _)| i)
            .collect())
    }

    /// Sources matching `filter_sources`, in configured order.
    pub fn select(&self, filter_sources: Option<&str>) -> Result<Vec<&dyn InventorySource>> {
        Ok(self
            .select_indices(filter_sources)?
            .into_iter()
            .map(|i| self.sources[i].as_ref())
            .collect())
    }

    /// Update each selected source in order. One source failing does not
    /// stop the others; its error is logged and recorded in the report.
    pub async fn update(&self, filter_sources: Option<&str>) -> Result<UpdateReport> {
        let mut report = UpdateReport::default();
        for source in self.select(filter_sources)? {
            let label = source.source_label();
            tracing::info!(source = %label, "updating inventory");
            let result = match source.update().await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    tracing::warn!(source = %label, error = %format!("{:#}", e), "inventory update failed");
                    Err(format!("{:#}", e))
                }
            };
            report.entries.push(SourceUpdate { label, result });
        }
        Ok(report)
    }

    /// Concatenated instances of the selected sources, source order first.
    pub fn instances(&self, filter_sources: Option<&str>) -> Result<Vec<Instance>> {
        let mut all = Vec::new();
        for source in self.select(filter_sources)? {
            all.extend(source.instances()?);
        }
        Ok(all)
    }

    /// Each source's own ranked results, concatenated in source order.
    pub fn search(&self, targets: &[String], opts: MatchOptions) -> Result<Vec<Instance>> {
        let mut all = Vec::new();
        for source in self.sources() {
            all.extend(source.search(targets, opts)?);
        }
        Ok(all)
    }
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("Invalid source pattern: {}", pattern))?
        .compile_matcher())
}
