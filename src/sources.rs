//! Source status listing (`hostbridge sources`).
//!
//! Reports, for every configured source, where its cache lives and when it
//! was last refreshed. A source that has never been updated shows as
//! `MISSING`; run `hostbridge update` to fill it.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::modified_at;
use crate::inventory::InventorySet;

/// Cache state of one configured source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub label: String,
    pub source_type: String,
    pub description: String,
    pub cache_path: PathBuf,
    /// `None` when the cache file does not exist yet.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SourceStatus {
    pub fn status(&self) -> &'static str {
        if self.updated_at.is_some() {
            "OK"
        } else {
            "MISSING"
        }
    }
}

pub fn get_sources(set: &InventorySet) -> Vec<SourceStatus> {
    set.sources()
        .map(|s| SourceStatus {
            label: s.source_label(),
            source_type: s.source_type().to_string(),
            description: s.description(),
            cache_path: s.cache_path().to_path_buf(),
            updated_at: modified_at(s.cache_path()),
        })
        .collect()
}

pub fn list_sources(set: &InventorySet) -> Result<()> {
    let sources = get_sources(set);

    println!("{:<28} {:<8} {:<20} DESCRIPTION", "SOURCE", "STATUS", "UPDATED");
    for s in &sources {
        let updated = s
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<28} {:<8} {:<20} {}",
            s.label,
            s.status(),
            updated,
            s.description
        );
    }

    Ok(())
}
