//! Command handlers behind the `hostbridge` binary.
//!
//! Each handler takes already-parsed arguments and a loaded [`Config`];
//! `main` only dispatches. Results go to stdout, diagnostics to stderr via
//! `tracing`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use hostbridge_core::{Instance, MatchOptions};

use crate::config::{load_config, Config, SAMPLE_CONFIG};
use crate::inventory::UpdateReport;
use crate::session::InventorySession;

/// Write the sample config (unless one exists) and create every source's
/// cache directory.
pub fn run_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
    } else {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        std::fs::write(config_path, SAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Wrote sample config: {}", config_path.display());
    }

    let config = load_config(config_path)?;
    for source in &config.inventory.sources {
        let dir = config.inventory.source_dir(source);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        println!("  {:<10} {}", source.source_type(), dir.display());
    }
    Ok(())
}

fn print_report(report: &UpdateReport) {
    for entry in &report.entries {
        match &entry.result {
            Ok(outcome) => println!("{:<28} {}", entry.label, outcome),
            Err(e) => println!("{:<28} FAILED: {}", entry.label, e),
        }
    }
}

/// Refresh the caches of the selected sources.
///
/// A failing source is reported and the remaining sources still run; the
/// command only fails when every selected source failed.
pub async fn run_update(config: &Config, source: Option<&str>) -> Result<()> {
    let mut session = InventorySession::from_config(&config.inventory)?;
    let report = session.update(source).await?;
    print_report(&report);

    if report.entries.is_empty() {
        bail!("No inventory source matches '{}'", source.unwrap_or("*"));
    }
    if report.failures().count() == report.entries.len() {
        bail!("Every inventory update failed");
    }
    Ok(())
}

/// Failures are already logged per source; listing carries on with the
/// previous caches.
async fn refresh_if_configured(config: &Config, session: &mut InventorySession, force: bool) -> Result<()> {
    if force || config.inventory.update_at_start {
        session.update(None).await?;
    }
    Ok(())
}

fn print_instances(instances: &[Instance], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(instances)?);
        return Ok(());
    }
    for instance in instances {
        println!("{}  {}", instance, instance.source);
    }
    Ok(())
}

/// Print every (filtered) instance in natural order.
pub async fn run_list(config: &Config, source: Option<&str>, json: bool) -> Result<()> {
    let mut session = InventorySession::from_config(&config.inventory)?;
    refresh_if_configured(config, &mut session, false).await?;

    let mut instances = session.instances(source)?;
    instances.sort();
    print_instances(&instances, json)
}

/// Flags accepted by `hostbridge search`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchFlags {
    pub fuzzy: bool,
    pub exact: bool,
    pub update: bool,
    pub json: bool,
}

impl SearchFlags {
    /// `--exact` disables both partial and fuzzy matching; otherwise fuzzy
    /// is on when requested here or in config.
    pub fn match_options(&self, config: &Config) -> MatchOptions {
        if self.exact {
            MatchOptions::exact()
        } else {
            MatchOptions {
                partial: true,
                fuzzy: self.fuzzy || config.inventory.fuzzy,
            }
        }
    }
}

/// Resolve `targets` against the inventory, best match first.
///
/// Zero matches is an error so scripts can tell it apart from success.
pub async fn run_search(config: &Config, targets: &[String], flags: SearchFlags) -> Result<()> {
    let mut session = InventorySession::from_config(&config.inventory)?;
    refresh_if_configured(config, &mut session, flags.update).await?;

    let opts = flags.match_options(config);
    let found = session.search(targets, opts)?;
    tracing::debug!(targets = ?targets, ?opts, matches = found.len(), "search complete");

    if found.is_empty() {
        bail!("Could not find matching host(s) for: {}", targets.join(" "));
    }
    print_instances(&found, flags.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_match_options_from_flags() {
        let config = parse_config(SAMPLE_CONFIG).unwrap();
        let plain = SearchFlags::default().match_options(&config);
        assert_eq!(plain, MatchOptions::default());

        let fuzzy = SearchFlags {
            fuzzy: true,
            ..Default::default()
        };
        assert_eq!(fuzzy.match_options(&config), MatchOptions::fuzzy());

        let exact = SearchFlags {
            fuzzy: true,
            exact: true,
            ..Default::default()
        };
        assert_eq!(exact.match_options(&config), MatchOptions::exact());
    }

    #[test]
    fn test_config_fuzzy_default() {
        let mut config = parse_config(SAMPLE_CONFIG).unwrap();
        config.inventory.fuzzy = true;
        assert!(SearchFlags::default().match_options(&config).fuzzy);
    }
}
