//! The inventory source contract.
//!
//! Every backend (EC2, ECS, a flat file, New Relic) implements
//! [`InventorySource`]. The aggregator in [`crate::inventory`] only ever sees
//! `Box<dyn InventorySource>`, so adding a backend means adding one
//! implementation and one arm in [`crate::inventory::build_source`].
//!
//! # Lifecycle
//!
//! ```text
//! config ──▶ build_source() ──▶ update()     network ─▶ cache file (replaced wholesale)
//!                               instances()  cache file ─▶ Vec<Instance>
//!                               search()     instances() ─▶ rank()
//! ```
//!
//! `update()` is the only operation that touches the network. `instances()`
//! is a pure read of the cache and may be called any number of times.

use std::future::Future;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use hostbridge_core::{rank, Instance, MatchOptions};
use serde::Serialize;

use crate::cache::write_json;

// ═══════════════════════════════════════════════════════════════════════
// Update outcome
// ═══════════════════════════════════════════════════════════════════════

/// What a call to [`InventorySource::update`] did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The cache was replaced with `records` freshly fetched records.
    Refreshed { records: usize },
    /// Nothing to fetch for this source; the cache was left alone.
    Unchanged,
    /// The user interrupted the fetch; the previous cache is intact.
    Cancelled,
}

impl std::fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refreshed { records } => write!(f, "refreshed ({} records)", records),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// InventorySource trait
// ═══════════════════════════════════════════════════════════════════════

/// A configured backend that supplies instances.
///
/// # Example
///
/// ```rust
/// use std::path::{Path, PathBuf};
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use hostbridge::traits::{InventorySource, UpdateOutcome};
/// use hostbridge_core::Instance;
///
/// struct Static {
///     path: PathBuf,
/// }
///
/// #[async_trait]
/// impl InventorySource for Static {
///     fn name(&self) -> Option<&str> { Some("lab") }
///     fn source_type(&self) -> &'static str { "static" }
///     fn description(&self) -> String { "two fixed hosts".into() }
///     fn cache_path(&self) -> &Path { &self.path }
///
///     async fn update(&self) -> Result<UpdateOutcome> {
///         Ok(UpdateOutcome::Unchanged)
///     }
///
///     fn instances(&self) -> Result<Vec<Instance>> {
///         let label = self.source_label();
///         Ok(["alpha", "beta"]
///             .iter()
///             .filter_map(|n| Instance::new(*n, format!("{}.lab", n), label.clone()))
///             .collect())
///     }
/// }
/// ```
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Configured name distinguishing sources of the same type.
    fn name(&self) -> Option<&str>;

    /// Backend identifier: `"aws"`, `"ecs"`, `"csv"`, `"newrelic"`.
    fn source_type(&self) -> &'static str;

    /// One-line description for `hostbridge sources`.
    fn description(&self) -> String;

    /// Label stamped on every instance: `"<name> (<type>)"`, or the bare
    /// type when the source is unnamed.
    fn source_label(&self) -> String {
        match self.name() {
            Some(name) => format!("{} ({})", name, self.source_type()),
            None => self.source_type().to_string(),
        }
    }

    /// The file `instances()` reads.
    fn cache_path(&self) -> &Path;

    /// Re-fetch from the backend and replace the cache.
    ///
    /// A user interrupt during the fetch resolves to
    /// [`UpdateOutcome::Cancelled`] rather than an error.
    async fn update(&self) -> Result<UpdateOutcome>;

    /// Decode the cache into instances. Never touches the network.
    ///
    /// A missing or undecodable cache is an error
    /// ([`crate::error::InventoryError`]); a malformed individual record is
    /// skipped.
    fn instances(&self) -> Result<Vec<Instance>>;

    /// Rank this source's instances against `targets`.
    fn search(&self, targets: &[String], opts: MatchOptions) -> Result<Vec<Instance>> {
        let instances = self.instances()?;
        Ok(rank(&instances, targets, opts))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════════

/// Race `fetch` against `interrupt`.
///
/// Returns `Ok(None)` if `interrupt` fires first; the fetch future is
/// dropped and nothing downstream (the cache write) runs. An interrupt
/// that is already ready wins before the fetch is polled. Fetch errors
/// propagate unchanged.
pub async fn cancellable<T, F, I>(label: &str, fetch: F, interrupt: I) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = interrupt => {
            tracing::info!(source = %label, "update cancelled by user");
            Ok(None)
        }
        result = fetch => result.map(Some),
    }
}

/// Run `fetch` under [`cancellable`] and replace `cache_file` with its
/// result. On interrupt or fetch error the previous cache is left as is.
pub async fn refresh_cache<T, F, I>(
    label: &str,
    cache_file: &Path,
    fetch: F,
    interrupt: I,
    count: fn(&T) -> usize,
) -> Result<UpdateOutcome>
where
    T: Serialize,
    F: Future<Output = Result<T>>,
    I: Future<Output = ()>,
{
    let Some(snapshot) = cancellable(label, fetch, interrupt).await? else {
        return Ok(UpdateOutcome::Cancelled);
    };

    let records = count(&snapshot);
    write_json(cache_file, &snapshot)?;
    tracing::info!(source = %label, records, "inventory updated");
    Ok(UpdateOutcome::Refreshed { records })
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be
/// installed.
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixed {
        name: Option<String>,
        path: PathBuf,
    }

    #[async_trait]
    impl InventorySource for Fixed {
        fn name(&self) -> Option<&str> {
            self.name.as_deref()
        }

        fn source_type(&self) -> &'static str {
            "fixed"
        }

        fn description(&self) -> String {
            "fixed test hosts".to_string()
        }

        fn cache_path(&self) -> &Path {
            &self.path
        }

        async fn update(&self) -> Result<UpdateOutcome> {
            Ok(UpdateOutcome::Unchanged)
        }

        fn instances(&self) -> Result<Vec<Instance>> {
            let label = self.source_label();
            Ok(["web-1", "web-2", "db-1"]
                .iter()
                .filter_map(|n| Instance::new(*n, format!("{}.internal", n), label.clone()))
                .collect())
        }
    }

    #[test]
    fn test_source_label() {
        let named = Fixed {
            name: Some("lab".into()),
            path: PathBuf::new(),
        };
        let unnamed = Fixed {
            name: None,
            path: PathBuf::new(),
        };
        assert_eq!(named.source_label(), "lab (fixed)");
        assert_eq!(unnamed.source_label(), "fixed");
    }

    #[test]
    fn test_default_search_ranks_instances() {
        let src = Fixed {
            name: None,
            path: PathBuf::new(),
        };
        let found = src
            .search(&["web".to_string()], MatchOptions::default())
            .unwrap();
        let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["web-2", "web-1"]);
        assert!(found.iter().all(|i| i.source == "fixed"));
    }

    #[tokio::test]
    async fn test_cancellable_completes() {
        let out = cancellable("t", async { Ok(7) }, std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn test_cancellable_interrupted() {
        let out: Option<u32> = cancellable("t", std::future::pending(), async {})
            .await
            .unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_cancellable_propagates_fetch_error() {
        let err = cancellable::<u32, _, _>(
            "t",
            async { Err(anyhow::anyhow!("connection refused")) },
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_refresh_cache_writes_on_success() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("hosts.json");
        let outcome = refresh_cache(
            "t",
            &path,
            async { Ok(vec!["a".to_string(), "b".to_string()]) },
            std::future::pending::<()>(),
            Vec::len,
        )
        .await
        .unwrap();
        assert_eq!(outcome, UpdateOutcome::Refreshed { records: 2 });
        let back: Vec<String> = crate::cache::read_json("t", &path).unwrap();
        assert_eq!(back, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_refresh_cache_keeps_previous_on_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("hosts.json");
        std::fs::write(&path, "[\"old\"]").unwrap();
        let result = refresh_cache::<Vec<String>, _, _>(
            "t",
            &path,
            async { Err(anyhow::anyhow!("access denied")) },
            std::future::pending::<()>(),
            Vec::len,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[\"old\"]");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            UpdateOutcome::Refreshed { records: 3 }.to_string(),
            "refreshed (3 records)"
        );
        assert_eq!(UpdateOutcome::Cancelled.to_string(), "cancelled");
    }
}
