//! ECS inventory source: one container instance per running container.
//!
//! `update()` walks the ECS JSON API cluster by cluster and joins each
//! task to the EC2 host it is placed on:
//!
//! ```text
//! ListClusters ─▶ ListTasks ─▶ DescribeTasks (×100)
//!             └─▶ ListContainerInstances ─▶ DescribeContainerInstances (×100)
//!                                           └─▶ EC2 DescribeInstances (hosts)
//! ```
//!
//! The raw task, container-instance and host records are cached together
//! in `<cache_dir>/ecs/<name>/ecs-tasks.json`. A container's address is its
//! host's address; tasks whose host cannot be resolved (Fargate, drained
//! instances) are dropped.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hostbridge_core::Instance;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::aws_sign::{send_signed, AwsCredentials, ServiceEndpoint};
use crate::cache::{decode_records, read_json};
use crate::config::{AwsCredentialsConfig, EcsSourceConfig, ProxyConfig};
use crate::http::build_client;
use crate::source_aws::{describe_instances, instance_from_record, Ec2Instance};
use crate::traits::{interrupted, refresh_cache, InventorySource, UpdateOutcome};

pub const CACHE_FILE: &str = "ecs-tasks.json";

const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";
/// DescribeTasks and DescribeContainerInstances accept at most 100 ARNs.
const DESCRIBE_BATCH: usize = 100;

// ═══════════════════════════════════════════════════════════════════════
// Cached shape
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcsSnapshot {
    #[serde(default)]
    pub clusters: Vec<ClusterSnapshot>,
}

/// Raw API records for one cluster, decoded record by record on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub cluster_arn: String,
    #[serde(default)]
    pub tasks: Vec<Value>,
    #[serde(default)]
    pub container_instances: Vec<Value>,
    #[serde(default)]
    pub hosts: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsTask {
    pub task_arn: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub container_instance_arn: Option<String>,
    #[serde(default)]
    pub containers: Vec<EcsContainer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsContainer {
    pub name: String,
    #[serde(default)]
    pub container_arn: Option<String>,
    #[serde(default)]
    pub runtime_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInstance {
    pub container_instance_arn: String,
    #[serde(default)]
    pub ec2_instance_id: Option<String>,
}

/// Last path segment of an ARN: the task id for a task ARN.
pub fn arn_id(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// `"service:web"` → `"web"`; any other group is kept as is.
pub fn service_name(group: &str) -> &str {
    group.strip_prefix("service:").unwrap_or(group)
}

/// Join one cluster's tasks to their hosts.
fn cluster_instances(label: &str, cluster: ClusterSnapshot) -> Vec<Instance> {
    let hosts: HashMap<String, Instance> =
        decode_records::<Ec2Instance>(label, "ecs host", cluster.hosts)
            .into_iter()
            .filter_map(|rec| instance_from_record(&rec, label).map(|i| (rec.instance_id, i)))
            .collect();

    let host_of: HashMap<String, String> =
        decode_records::<ContainerInstance>(label, "container instance", cluster.container_instances)
            .into_iter()
            .filter_map(|ci| ci.ec2_instance_id.map(|id| (ci.container_instance_arn, id)))
            .collect();

    let mut out = Vec::new();
    for task in decode_records::<EcsTask>(label, "ecs task", cluster.tasks) {
        let host = task
            .container_instance_arn
            .as_ref()
            .and_then(|arn| host_of.get(arn))
            .and_then(|id| hosts.get(id));
        let Some(host) = host else {
            tracing::debug!(source = %label, task = %task.task_arn, "no resolvable host, skipping task");
            continue;
        };

        let task_id = arn_id(&task.task_arn);
        let service = task.group.as_deref().map(service_name);

        for container in &task.containers {
            let container_id = container
                .runtime_id
                .clone()
                .or_else(|| container.container_arn.as_deref().map(|a| arn_id(a).to_string()));
            let Some(instance) = Instance::new(&container.name, &host.address, label) else {
                continue;
            };
            out.push(
                instance
                    .with_aliases(service.into_iter().chain(std::iter::once(task_id)))
                    .into_container(container_id, Some(task_id.to_string())),
            );
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
// ECS JSON API
// ═══════════════════════════════════════════════════════════════════════

struct EcsApi<'a> {
    http: &'a reqwest::Client,
    endpoint: &'a ServiceEndpoint,
    creds: &'a AwsCredentials,
}

impl EcsApi<'_> {
    async fn call<T: DeserializeOwned>(&self, action: &str, body: Map<String, Value>) -> Result<T> {
        let headers = vec![
            (
                "content-type".to_string(),
                "application/x-amz-json-1.1".to_string(),
            ),
            (
                "x-amz-target".to_string(),
                format!("{}.{}", TARGET_PREFIX, action),
            ),
        ];
        let payload = serde_json::to_vec(&Value::Object(body))?;
        let text = send_signed(
            self.http,
            self.endpoint,
            self.creds,
            reqwest::Method::POST,
            &[],
            &headers,
            payload,
        )
        .await?;
        serde_json::from_str(&text).with_context(|| format!("Failed to decode ECS {} response", action))
    }

    /// Follow `nextToken` until exhausted, collecting the ARNs in `field`.
    async fn list_all(&self, action: &str, field: &str, cluster: Option<&str>) -> Result<Vec<String>> {
        let mut body = Map::new();
        if let Some(cluster) = cluster {
            body.insert("cluster".into(), Value::String(cluster.to_string()));
        }

        let mut arns = Vec::new();
        loop {
            let page: Value = self.call(action, body.clone()).await?;
            if let Some(items) = page.get(field).and_then(Value::as_array) {
                arns.extend(items.iter().filter_map(Value::as_str).map(String::from));
            }
            match page.get("nextToken").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => {
                    body.insert("nextToken".into(), Value::String(token.to_string()));
                }
                _ => break,
            }
        }
        Ok(arns)
    }

    async fn describe_all(
        &self,
        action: &str,
        cluster: &str,
        request_field: &str,
        arns: &[String],
        response_field: &str,
    ) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        for batch in arns.chunks(DESCRIBE_BATCH) {
            let mut body = Map::new();
            body.insert("cluster".into(), Value::String(cluster.to_string()));
            body.insert(
                request_field.into(),
                Value::Array(batch.iter().cloned().map(Value::String).collect()),
            );
            let page: Value = self.call(action, body).await?;
            if let Some(items) = page.get(response_field).and_then(Value::as_array) {
                records.extend(items.iter().cloned());
            }
        }
        Ok(records)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Source
// ═══════════════════════════════════════════════════════════════════════

pub struct EcsInventory {
    name: Option<String>,
    credentials: AwsCredentialsConfig,
    clusters: Vec<String>,
    ecs_endpoint: ServiceEndpoint,
    ec2_endpoint: ServiceEndpoint,
    proxies: ProxyConfig,
    cache_file: PathBuf,
}

impl EcsInventory {
    pub fn new(config: &EcsSourceConfig, cache_dir: &Path, proxies: ProxyConfig) -> Self {
        Self {
            name: config.name.clone(),
            credentials: config.credentials.clone(),
            clusters: config.clusters.clone(),
            ecs_endpoint: ServiceEndpoint::new("ecs", &config.region, config.ecs_endpoint_url.as_deref()),
            ec2_endpoint: ServiceEndpoint::new("ec2", &config.region, config.ec2_endpoint_url.as_deref()),
            proxies,
            cache_file: cache_dir.join(CACHE_FILE),
        }
    }

    async fn fetch(&self, http: &reqwest::Client, creds: &AwsCredentials) -> Result<EcsSnapshot> {
        let api = EcsApi {
            http,
            endpoint: &self.ecs_endpoint,
            creds,
        };

        let cluster_arns = if self.clusters.is_empty() {
            api.list_all("ListClusters", "clusterArns", None).await?
        } else {
            self.clusters.clone()
        };

        let mut clusters = Vec::with_capacity(cluster_arns.len());
        for cluster in cluster_arns {
            let task_arns = api.list_all("ListTasks", "taskArns", Some(&cluster)).await?;
            let tasks = api
                .describe_all("DescribeTasks", &cluster, "tasks", &task_arns, "tasks")
                .await?;

            let ci_arns = api
                .list_all("ListContainerInstances", "containerInstanceArns", Some(&cluster))
                .await?;
            let container_instances = api
                .describe_all(
                    "DescribeContainerInstances",
                    &cluster,
                    "containerInstances",
                    &ci_arns,
                    "containerInstances",
                )
                .await?;

            let ec2_ids: Vec<String> = container_instances
                .iter()
                .filter_map(|ci| ci.get("ec2InstanceId").and_then(Value::as_str))
                .map(String::from)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let mut hosts = Vec::new();
            if !ec2_ids.is_empty() {
                for reservation in describe_instances(http, &self.ec2_endpoint, creds, &ec2_ids).await? {
                    for host in reservation.instances {
                        hosts.push(serde_json::to_value(host)?);
                    }
                }
            }

            tracing::debug!(
                cluster = %cluster,
                tasks = tasks.len(),
                hosts = hosts.len(),
                "ecs cluster fetched"
            );
            clusters.push(ClusterSnapshot {
                cluster_arn: cluster,
                tasks,
                container_instances,
                hosts,
            });
        }

        Ok(EcsSnapshot { clusters })
    }

    /// Walk the configured clusters and replace the cache, unless
    /// `interrupt` resolves first.
    pub async fn refresh<I>(&self, interrupt: I) -> Result<UpdateOutcome>
    where
        I: Future<Output = ()> + Send,
    {
        let label = self.source_label();
        let creds = AwsCredentials::resolve(&self.credentials)
            .with_context(|| format!("{}: no usable AWS credentials", label))?;
        let http = build_client(&self.proxies)?;

        refresh_cache(&label, &self.cache_file, self.fetch(&http, &creds), interrupt, |s: &EcsSnapshot| {
            s.clusters.iter().map(|c| c.tasks.len()).sum()
        })
        .await
    }
}

#[async_trait]
impl InventorySource for EcsInventory {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn source_type(&self) -> &'static str {
        "ecs"
    }

    fn description(&self) -> String {
        if self.clusters.is_empty() {
            format!("ECS containers in {} (all clusters)", self.ecs_endpoint.region)
        } else {
            format!(
                "ECS containers in {} ({})",
                self.ecs_endpoint.region,
                self.clusters.join(", ")
            )
        }
    }

    fn cache_path(&self) -> &Path {
        &self.cache_file
    }

    async fn update(&self) -> Result<UpdateOutcome> {
        self.refresh(interrupted()).await
    }

    fn instances(&self) -> Result<Vec<Instance>> {
        let label = self.source_label();
        let snapshot: EcsSnapshot = read_json(&label, &self.cache_file)?;
        Ok(snapshot
            .clusters
            .into_iter()
            .flat_map(|cluster| cluster_instances(&label, cluster))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::InstanceKind;
    use tempfile::TempDir;

    const FIXTURE: &str = include_str!("../tests/fixtures/ecs/ecs-tasks.json");

    fn source_in(dir: &Path) -> EcsInventory {
        let config = EcsSourceConfig {
            name: Some("prod".into()),
            region: "us-west-2".into(),
            credentials: AwsCredentialsConfig::default(),
            clusters: vec!["web".into()],
            ecs_endpoint_url: None,
            ec2_endpoint_url: None,
        };
        EcsInventory::new(&config, dir, ProxyConfig::default())
    }

    fn fixture_instances() -> Vec<Instance> {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CACHE_FILE), FIXTURE).unwrap();
        source_in(tmp.path()).instances().unwrap()
    }

    #[test]
    fn test_arn_helpers() {
        assert_eq!(arn_id("arn:aws:ecs:us-west-2:1:task/web/1111aaaa"), "1111aaaa");
        assert_eq!(arn_id("plain"), "plain");
        assert_eq!(service_name("service:frontend"), "frontend");
        assert_eq!(service_name("family:batch"), "family:batch");
    }

    #[test]
    fn test_containers_joined_to_hosts() {
        let instances = fixture_instances();
        let names: Vec<&str> = instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["nginx", "frontend-app", "worker"]);

        let nginx = &instances[0];
        assert_eq!(nginx.kind, InstanceKind::Container);
        assert_eq!(nginx.address, "10.0.1.10");
        assert_eq!(nginx.aliases, vec!["frontend", "1111aaaa"]);
        assert_eq!(nginx.task_id.as_deref(), Some("1111aaaa"));
        assert_eq!(nginx.container_id.as_deref(), Some("abc123"));
        assert_eq!(nginx.source, "prod (ecs)");

        let worker = &instances[2];
        assert_eq!(worker.address, "10.0.1.11");
        assert_eq!(worker.container_id.as_deref(), Some("c3"));
    }

    #[test]
    fn test_unresolvable_hosts_dropped() {
        let instances = fixture_instances();
        assert!(instances.iter().all(|i| i.task_id.as_deref() != Some("3333cccc")));
        assert!(instances.iter().all(|i| i.name != "batch"));
    }

    #[test]
    fn test_service_alias_is_searchable() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CACHE_FILE), FIXTURE).unwrap();
        let found = source_in(tmp.path())
            .search(&["frontend".to_string()], hostbridge_core::MatchOptions::exact())
            .unwrap();
        let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["nginx", "frontend-app"]);
    }

    #[tokio::test]
    async fn test_interrupted_refresh_keeps_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join(CACHE_FILE);
        std::fs::write(&cache, FIXTURE).unwrap();

        let config = EcsSourceConfig {
            name: None,
            region: "us-west-2".into(),
            credentials: AwsCredentialsConfig {
                access_key_id: Some("AKIDEXAMPLE".into()),
                secret_access_key: Some("secret".into()),
                session_token: None,
            },
            clusters: Vec::new(),
            ecs_endpoint_url: None,
            ec2_endpoint_url: None,
        };
        let src = EcsInventory::new(&config, tmp.path(), ProxyConfig::default());
        assert_eq!(src.refresh(async {}).await.unwrap(), UpdateOutcome::Cancelled);
        assert_eq!(std::fs::read_to_string(&cache).unwrap(), FIXTURE);
    }

    #[test]
    fn test_description_lists_clusters() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(source_in(tmp.path()).description(), "ECS containers in us-west-2 (web)");
    }
}
