//! Flat-file inventory source.
//!
//! One host per line, columns named by the configured `fields` and split on
//! `delimiter`. Only the `name` and `address` columns are used; any other
//! column is carried in the file for humans and ignored here.
//!
//! ```text
//! testenv-pubsrv|1.2.3.4|rack 12
//! devenv-pubsrv|9.10.11.12|rack 3
//! ```
//!
//! The file is maintained by hand, so `update()` has nothing to fetch.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use hostbridge_core::Instance;

use crate::cache::read_text;
use crate::config::CsvSourceConfig;
use crate::traits::{InventorySource, UpdateOutcome};

pub struct CsvInventory {
    name: Option<String>,
    file: PathBuf,
    fields: Vec<String>,
    delimiter: String,
}

impl CsvInventory {
    /// Relative `file` paths resolve against `source_dir`.
    pub fn new(config: &CsvSourceConfig, source_dir: &Path) -> Self {
        let file = if config.file.is_absolute() {
            config.file.clone()
        } else {
            source_dir.join(&config.file)
        };
        let delimiter = match config.delimiter.trim() {
            "" => ",".to_string(),
            d => d.to_string(),
        };
        Self {
            name: config.name.clone(),
            file,
            fields: config.fields.names(),
            delimiter,
        }
    }
}

/// Parse `content` into distinct instances in natural order.
///
/// Blank lines and rows without a usable name or address are skipped.
pub fn parse_rows(content: &str, fields: &[String], delimiter: &str, source: &str) -> Vec<Instance> {
    let mut instances = BTreeSet::new();

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: HashMap<&str, &str> = fields
            .iter()
            .map(String::as_str)
            .zip(line.split(delimiter))
            .collect();

        let name = row.get("name").copied().unwrap_or_default();
        let address = row.get("address").copied().unwrap_or_default();
        match Instance::new(name, address, source) {
            Some(instance) => {
                instances.insert(instance);
            }
            None => tracing::debug!(source = %source, line = lineno + 1, "skipping row without name or address"),
        }
    }

    instances.into_iter().collect()
}

#[async_trait]
impl InventorySource for CsvInventory {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn source_type(&self) -> &'static str {
        "csv"
    }

    fn description(&self) -> String {
        format!("hosts listed in {}", self.file.display())
    }

    fn cache_path(&self) -> &Path {
        &self.file
    }

    async fn update(&self) -> Result<UpdateOutcome> {
        tracing::debug!(source = %self.source_label(), "flat file is maintained by hand, nothing to fetch");
        Ok(UpdateOutcome::Unchanged)
    }

    fn instances(&self) -> Result<Vec<Instance>> {
        let label = self.source_label();
        let content = read_text(&label, &self.file)?;
        Ok(parse_rows(&content, &self.fields, &self.delimiter, &label))
    }
}
