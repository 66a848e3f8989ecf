//! New Relic Infrastructure inventory source.
//!
//! `update()` runs two NRQL queries against the Insights query API and
//! stores both responses in one file, keyed by section:
//!
//! ```text
//! <cache_dir>/newrelic/<name>/<account>.json
//! {
//!   "VM":  { "results": [{ "events": [NetworkSample, ...] }] },
//!   "ECS": { "results": [{ "events": [ProcessSample, ...] }] }
//! }
//! ```
//!
//! Process samples from containers rarely carry an address, so one is recovered from the
//! agent's hostname when it embeds a dotted quad (`ip-10-0-1-2` →
//! `10.0.1.2`). Containers with no recoverable address are dropped.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hostbridge_core::Instance;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{decode_records, read_json};
use crate::config::{NewRelicSourceConfig, ProxyConfig};
use crate::http::build_client;
use crate::traits::{interrupted, refresh_cache, InventorySource, UpdateOutcome};

const QUERY_URL: &str = "https://insights-api.newrelic.com/v1/accounts";

const VM_QUERY: &str =
    "SELECT entityName, fullHostname, hostname, ipV4Address FROM NetworkSample LIMIT 999";
const CONTAINER_QUERY: &str = "SELECT containerName, containerId, hostname, entityName \
     FROM ProcessSample WHERE containerName IS NOT NULL LIMIT 999";

static DOTTED_QUAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3})[-.](\d{1,3})[-.](\d{1,3})[-.](\d{1,3})").expect("valid regex")
});

// ═══════════════════════════════════════════════════════════════════════
// Cached shape
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(rename = "VM", default)]
    pub vm: QueryResponse,
    #[serde(rename = "ECS", default)]
    pub ecs: QueryResponse,
}

/// The parts of an Insights query response we keep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub events: Vec<Value>,
}

impl QueryResponse {
    fn events(self) -> Vec<Value> {
        self.results.into_iter().flat_map(|r| r.events).collect()
    }

    fn event_count(&self) -> usize {
        self.results.iter().map(|r| r.events.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkSample {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    ip_v4_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessSample {
    #[serde(default)]
    container_name: Option<String>,
    #[serde(default)]
    container_id: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    ip_v4_address: Option<String>,
}

/// `"172.16.221.211/24"` → `"172.16.221.211"`.
fn strip_prefix_len(address: &str) -> Option<&str> {
    address
        .split('/')
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
}

/// Recover a dotted quad embedded in a hostname such as `ip-10-0-1-2`.
pub fn address_from_hostname(hostname: &str) -> Option<String> {
    let caps = DOTTED_QUAD.captures(hostname)?;
    Some(format!("{}.{}.{}.{}", &caps[1], &caps[2], &caps[3], &caps[4]))
}

/// Map both sections of a snapshot to distinct instances in natural order.
pub fn snapshot_instances(label: &str, snapshot: TelemetrySnapshot) -> Vec<Instance> {
    let mut instances = BTreeSet::new();

    for sample in decode_records::<NetworkSample>(label, "network sample", snapshot.vm.events()) {
        let Some(address) = sample.ip_v4_address.as_deref().and_then(strip_prefix_len) else {
            continue;
        };
        let name = sample
            .hostname
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(address);
        instances.extend(Instance::new(name, address, label));
    }

    for sample in decode_records::<ProcessSample>(label, "process sample", snapshot.ecs.events()) {
        let address = sample
            .ip_v4_address
            .as_deref()
            .and_then(strip_prefix_len)
            .map(String::from)
            .or_else(|| sample.hostname.as_deref().and_then(address_from_hostname));
        let (Some(name), Some(address)) = (sample.container_name.as_deref(), address) else {
            tracing::debug!(source = %label, container = ?sample.container_name, "no derivable address, skipping container");
            continue;
        };
        instances.extend(
            Instance::new(name, &address, label).map(|i| i.into_container(sample.container_id.clone(), None)),
        );
    }

    instances.into_iter().collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Source
// ═══════════════════════════════════════════════════════════════════════

pub struct NewRelicInventory {
    name: String,
    account_number: String,
    api_key: String,
    proxies: ProxyConfig,
    cache_file: PathBuf,
}

impl NewRelicInventory {
    /// Unnamed sources are called `acct:<account_number>`.
    pub fn new(config: &NewRelicSourceConfig, cache_dir: &Path, proxies: ProxyConfig) -> Self {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("acct:{}", config.account_number));
        Self {
            name,
            account_number: config.account_number.clone(),
            api_key: config.insights_query_api_key.clone(),
            proxies,
            cache_file: cache_dir.join(format!("{}.json", config.account_number)),
        }
    }

    async fn query(&self, client: &reqwest::Client, nrql: &str) -> Result<QueryResponse> {
        let url = format!("{}/{}/query", QUERY_URL, self.account_number);
        let resp = client
            .get(&url)
            .query(&[("nrql", nrql)])
            .header("X-Query-Key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to reach New Relic for account {}", self.account_number))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "New Relic query failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        resp.json()
            .await
            .context("Failed to decode New Relic query response")
    }

    async fn fetch(&self) -> Result<TelemetrySnapshot> {
        let client = build_client(&self.proxies)?;
        let vm = self.query(&client, VM_QUERY).await?;
        let ecs = self.query(&client, CONTAINER_QUERY).await?;
        Ok(TelemetrySnapshot { vm, ecs })
    }

    /// Fetch both sections and replace the cache, unless `interrupt`
    /// resolves first.
    pub async fn refresh<I>(&self, interrupt: I) -> Result<UpdateOutcome>
    where
        I: Future<Output = ()> + Send,
    {
        let label = self.source_label();
        refresh_cache(&label, &self.cache_file, self.fetch(), interrupt, |s: &TelemetrySnapshot| {
            s.vm.event_count() + s.ecs.event_count()
        })
        .await
    }
}

#[async_trait]
impl InventorySource for NewRelicInventory {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn source_type(&self) -> &'static str {
        "newrelic"
    }

    fn description(&self) -> String {
        format!("New Relic infrastructure hosts for account {}", self.account_number)
    }

    fn cache_path(&self) -> &Path {
        &self.cache_file
    }

    async fn update(&self) -> Result<UpdateOutcome> {
        self.refresh(interrupted()).await
    }

    fn instances(&self) -> Result<Vec<Instance>> {
        let label = self.source_label();
        let snapshot: TelemetrySnapshot = read_json(&label, &self.cache_file)?;
        Ok(snapshot_instances(&label, snapshot))
    }
}
