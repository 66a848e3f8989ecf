//! EC2 inventory source.
//!
//! `update()` pages through the EC2 `DescribeInstances` Query API (signed
//! with SigV4, XML response) and stores the result in the familiar
//! `{"Reservations": [{"Instances": [...]}]}` JSON shape:
//!
//! ```text
//! <cache_dir>/aws/<name>/ec2-describe-instances.json
//! ```
//!
//! # Mapping
//!
//! | Instance field | Taken from |
//! |----------------|-----------|
//! | `address` | public DNS name, else private IP |
//! | `name` | first of: `Name` tag, public DNS, private DNS, instance id |
//! | `aliases` | the rest of that list, in order |
//!
//! Instances with no public DNS name and no private IP are skipped.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hostbridge_core::Instance;
use serde::{Deserialize, Serialize};

use crate::aws_sign::{send_signed, AwsCredentials, ServiceEndpoint};
use crate::cache::{decode_records, read_json};
use crate::config::{AwsCredentialsConfig, AwsSourceConfig, ProxyConfig};
use crate::http::build_client;
use crate::traits::{interrupted, refresh_cache, InventorySource, UpdateOutcome};

pub const CACHE_FILE: &str = "ec2-describe-instances.json";

const EC2_API_VERSION: &str = "2016-11-15";
const PAGE_SIZE: &str = "1000";
/// Upper bound on `InstanceId.N` parameters per request.
const ID_BATCH: usize = 100;

// ═══════════════════════════════════════════════════════════════════════
// Cached shape
// ═══════════════════════════════════════════════════════════════════════

/// A `DescribeInstances` result. `T` is [`Ec2Instance`] when writing and
/// raw JSON when reading, so one bad record cannot spoil the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct DescribeInstances<T> {
    #[serde(default)]
    pub reservations: Vec<Reservation<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Reservation<T> {
    #[serde(default)]
    pub instances: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ec2Instance {
    pub instance_id: String,
    #[serde(default)]
    pub public_dns_name: Option<String>,
    #[serde(default)]
    pub private_dns_name: Option<String>,
    #[serde(default)]
    pub private_ip_address: Option<String>,
    #[serde(default)]
    pub tags: Vec<Ec2Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ec2Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Ec2Instance {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Map one EC2 record to an instance labelled `source`.
pub fn instance_from_record(record: &Ec2Instance, source: &str) -> Option<Instance> {
    let address = non_blank(&record.public_dns_name).or(non_blank(&record.private_ip_address))?;

    let mut names: Vec<&str> = Vec::with_capacity(4);
    if let Some(tag) = record.tag("Name").map(str::trim).filter(|v| !v.is_empty()) {
        names.push(tag);
    }
    names.extend(non_blank(&record.public_dns_name));
    names.extend(non_blank(&record.private_dns_name));
    let id = record.instance_id.trim();
    if !id.is_empty() {
        names.push(id);
    }

    let (name, aliases) = names.split_first()?;
    Instance::new(name, address, source).map(|i| i.with_aliases(aliases.iter().copied()))
}

// ═══════════════════════════════════════════════════════════════════════
// EC2 Query API
// ═══════════════════════════════════════════════════════════════════════

/// `<item>` children of an EC2 `*Set` element.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ItemSet<T> {
    #[serde(default)]
    item: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { item: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlDescribeInstances {
    #[serde(default)]
    reservation_set: ItemSet<XmlReservation>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlReservation {
    #[serde(default)]
    instances_set: ItemSet<XmlInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlInstance {
    instance_id: String,
    #[serde(default)]
    dns_name: Option<String>,
    #[serde(default)]
    private_dns_name: Option<String>,
    #[serde(default)]
    private_ip_address: Option<String>,
    #[serde(default)]
    tag_set: ItemSet<XmlTag>,
}

#[derive(Debug, Deserialize)]
struct XmlTag {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

impl From<XmlInstance> for Ec2Instance {
    fn from(x: XmlInstance) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            instance_id: x.instance_id,
            public_dns_name: keep(x.dns_name),
            private_dns_name: keep(x.private_dns_name),
            private_ip_address: keep(x.private_ip_address),
            tags: x
                .tag_set
                .item
                .into_iter()
                .map(|t| Ec2Tag {
                    key: t.key,
                    value: t.value.unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Decode one `DescribeInstancesResponse` page.
pub fn parse_describe_instances(xml: &str) -> Result<(Vec<Reservation<Ec2Instance>>, Option<String>)> {
    let page: XmlDescribeInstances =
        quick_xml::de::from_str(xml).context("Failed to parse DescribeInstances response")?;

    let reservations = page
        .reservation_set
        .item
        .into_iter()
        .map(|r| Reservation {
            instances: r.instances_set.item.into_iter().map(Ec2Instance::from).collect(),
        })
        .collect();
    let next_token = page.next_token.filter(|t| !t.trim().is_empty());
    Ok((reservations, next_token))
}

/// Every reservation visible to `creds`, or only those holding
/// `instance_ids` when that is non-empty.
pub async fn describe_instances(
    client: &reqwest::Client,
    endpoint: &ServiceEndpoint,
    creds: &AwsCredentials,
    instance_ids: &[String],
) -> Result<Vec<Reservation<Ec2Instance>>> {
    let mut reservations = Vec::new();

    if instance_ids.is_empty() {
        let params = vec![("MaxResults".to_string(), PAGE_SIZE.to_string())];
        reservations.extend(describe_pages(client, endpoint, creds, params).await?);
        return Ok(reservations);
    }

    for batch in instance_ids.chunks(ID_BATCH) {
        let params = batch
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("InstanceId.{}", i + 1), id.clone()))
            .collect();
        reservations.extend(describe_pages(client, endpoint, creds, params).await?);
    }
    Ok(reservations)
}

async fn describe_pages(
    client: &reqwest::Client,
    endpoint: &ServiceEndpoint,
    creds: &AwsCredentials,
    params: Vec<(String, String)>,
) -> Result<Vec<Reservation<Ec2Instance>>> {
    let mut reservations = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let mut query = vec![
            ("Action".to_string(), "DescribeInstances".to_string()),
            ("Version".to_string(), EC2_API_VERSION.to_string()),
        ];
        query.extend(params.iter().cloned());
        if let Some(ref token) = next_token {
            query.push(("NextToken".to_string(), token.clone()));
        }

        let body = send_signed(
            client,
            endpoint,
            creds,
            reqwest::Method::GET,
            &query,
            &[],
            Vec::new(),
        )
        .await?;
        let (page, token) = parse_describe_instances(&body)?;
        tracing::debug!(reservations = page.len(), more = token.is_some(), "DescribeInstances page");
        reservations.extend(page);

        match token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    Ok(reservations)
}

// ═══════════════════════════════════════════════════════════════════════
// Source
// ═══════════════════════════════════════════════════════════════════════

pub struct AwsInventory {
    name: Option<String>,
    credentials: AwsCredentialsConfig,
    endpoint: ServiceEndpoint,
    proxies: ProxyConfig,
    cache_file: PathBuf,
}

impl AwsInventory {
    pub fn new(config: &AwsSourceConfig, cache_dir: &Path, proxies: ProxyConfig) -> Self {
        Self {
            name: config.name.clone(),
            credentials: config.credentials.clone(),
            endpoint: ServiceEndpoint::new("ec2", &config.region, config.endpoint_url.as_deref()),
            proxies,
            cache_file: cache_dir.join(CACHE_FILE),
        }
    }

    /// Describe every instance and replace the cache, unless `interrupt`
    /// resolves first.
    pub async fn refresh<I>(&self, interrupt: I) -> Result<UpdateOutcome>
    where
        I: Future<Output = ()> + Send,
    {
        let label = self.source_label();
        let creds = AwsCredentials::resolve(&self.credentials)
            .with_context(|| format!("{}: no usable AWS credentials", label))?;
        let client = build_client(&self.proxies)?;

        let fetch = async {
            let reservations = describe_instances(&client, &self.endpoint, &creds, &[]).await?;
            Ok::<_, anyhow::Error>(DescribeInstances { reservations })
        };
        refresh_cache(&label, &self.cache_file, fetch, interrupt, |s: &DescribeInstances<Ec2Instance>| {
            s.reservations.iter().map(|r| r.instances.len()).sum()
        })
        .await
    }
}

#[async_trait]
impl InventorySource for AwsInventory {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn source_type(&self) -> &'static str {
        "aws"
    }

    fn description(&self) -> String {
        format!("EC2 instances in {}", self.endpoint.region)
    }

    fn cache_path(&self) -> &Path {
        &self.cache_file
    }

    async fn update(&self) -> Result<UpdateOutcome> {
        self.refresh(interrupted()).await
    }

    fn instances(&self) -> Result<Vec<Instance>> {
        let label = self.source_label();
        let snapshot: DescribeInstances<serde_json::Value> = read_json(&label, &self.cache_file)?;

        Ok(snapshot
            .reservations
            .into_iter()
            .flat_map(|r| decode_records::<Ec2Instance>(&label, "ec2 instance", r.instances))
            .filter_map(|record| instance_from_record(&record, &label))
            .collect())
    }
}
