//! One invocation's view of the inventory.
//!
//! An [`InventorySession`] owns the [`InventorySet`] and the compiled
//! include/exclude filter for one CLI run. Each source's cache is decoded
//! at most once, and only when a selected source is first read; listing
//! and searching then share those instances and apply the same filter.
//! Decoded caches are dropped whenever the session updates its sources.

use anyhow::{Context, Result};
use hostbridge_core::{rank, Instance, InstanceFilter, MatchOptions};
use once_cell::unsync::OnceCell;

use crate::config::InventoryConfig;
use crate::inventory::{InventorySet, UpdateReport};

pub struct InventorySession {
    set: InventorySet,
    filter: InstanceFilter,
    /// Unfiltered instances, one cell per source in source order.
    decoded: Vec<OnceCell<Vec<Instance>>>,
}

fn empty_cells(len: usize) -> Vec<OnceCell<Vec<Instance>>> {
    (0..len).map(|_| OnceCell::new()).collect()
}

impl InventorySession {
    pub fn new(set: InventorySet, filter: InstanceFilter) -> Self {
        let decoded = empty_cells(set.len());
        Self {
            set,
            filter,
            decoded,
        }
    }

    pub fn from_config(config: &InventoryConfig) -> Result<Self> {
        let filter = InstanceFilter::new(
            config.include_pattern.as_deref(),
            config.exclude_pattern.as_deref(),
        )
        .context("Invalid include_pattern or exclude_pattern")?;
        Ok(Self::new(InventorySet::from_config(config), filter))
    }

    pub fn set(&self) -> &InventorySet {
        &self.set
    }

    pub fn filter(&self) -> &InstanceFilter {
        &self.filter
    }

    /// Refresh the selected sources and forget every decoded cache.
    pub async fn update(&mut self, filter_sources: Option<&str>) -> Result<UpdateReport> {
        let report = self.set.update(filter_sources).await?;
        self.decoded = empty_cells(self.set.len());
        Ok(report)
    }

    /// Instances of the source at `index`, read from its cache on first use.
    fn source_instances(&self, index: usize) -> Result<&[Instance]> {
        let Some(source) = self.set.get(index) else {
            return Ok(&[]);
        };
        self.decoded[index]
            .get_or_try_init(|| {
                let instances = source.instances()?;
                tracing::debug!(source = %source.source_label(), count = instances.len(), "inventory cache decoded");
                Ok::<_, anyhow::Error>(instances)
            })
            .map(Vec::as_slice)
    }

    fn visible(&self, index: usize) -> Result<impl Iterator<Item = &Instance>> {
        let filter = &self.filter;
        Ok(self
            .source_instances(index)?
            .iter()
            .filter(move |i| filter.matches(i)))
    }

    /// Filtered instances of the sources matching `filter_sources`.
    /// Sources outside the selection are never read.
    pub fn instances(&self, filter_sources: Option<&str>) -> Result<Vec<Instance>> {
        let mut all = Vec::new();
        for index in self.set.select_indices(filter_sources)? {
            all.extend(self.visible(index)?.cloned());
        }
        Ok(all)
    }

    /// Rank every source's filtered instances against `targets`, one
    /// ranked block per source, in source order.
    pub fn search(&self, targets: &[String], opts: MatchOptions) -> Result<Vec<Instance>> {
        let mut found = Vec::new();
        for index in 0..self.set.len() {
            let visible: Vec<Instance> = self.visible(index)?.cloned().collect();
            found.extend(rank(&visible, targets, opts));
        }
        Ok(found)
    }
}
