//! TOML configuration parsing and validation.
//!
//! The configuration is decoded once into typed structs and validated by
//! [`load_config`]; everything downstream receives strongly-typed values.
//!
//! ```toml
//! [inventory]
//! cache_dir = "~/.hostbridge/inventory"
//! include_pattern = "prod-.*"
//! update_at_start = false
//!
//! [[inventory.sources]]
//! type = "aws"
//! name = "prod"
//! region = "us-west-2"
//!
//! [[inventory.sources]]
//! type = "csv"
//! file = "hosts.csv"
//! fields = "name, address, rack"
//! delimiter = "|"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Placeholder left in the sample config for the New Relic key.
const API_KEY_PLACEHOLDER: &str = "API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub include_pattern: Option<String>,
    #[serde(default)]
    pub exclude_pattern: Option<String>,
    /// Refresh every source before `list` and `search`.
    #[serde(default)]
    pub update_at_start: bool,
    /// Default for `search --fuzzy`.
    #[serde(default)]
    pub fuzzy: bool,
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub https_proxy: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_cache_dir() -> PathBuf {
    home_dir().join(".hostbridge").join("inventory")
}

/// One configured inventory backend, tagged by `type`.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Aws(AwsSourceConfig),
    Ecs(EcsSourceConfig),
    Csv(CsvSourceConfig),
    Newrelic(NewRelicSourceConfig),
}

impl SourceConfig {
    pub fn source_type(&self) -> &'static str {
        match self {
            Self::Aws(_) => "aws",
            Self::Ecs(_) => "ecs",
            Self::Csv(_) => "csv",
            Self::Newrelic(_) => "newrelic",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Aws(c) => c.name.as_deref(),
            Self::Ecs(c) => c.name.as_deref(),
            Self::Csv(c) => c.name.as_deref(),
            Self::Newrelic(c) => c.name.as_deref(),
        }
    }

    /// Name the source is known by once built: the configured name, or
    /// `acct:<account_number>` for an unnamed New Relic source, or
    /// `"default"`.
    pub fn effective_name(&self) -> String {
        match (self, self.name()) {
            (_, Some(name)) => name.to_string(),
            (Self::Newrelic(c), None) => format!("acct:{}", c.account_number),
            (_, None) => "default".to_string(),
        }
    }
}

/// Static AWS credentials. Any missing value falls back to the standard
/// `AWS_*` environment variables at request time.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AwsCredentialsConfig {
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsSourceConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub region: String,
    #[serde(flatten)]
    pub credentials: AwsCredentialsConfig,
    /// Override the EC2 endpoint (LocalStack and friends).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EcsSourceConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub region: String,
    #[serde(flatten)]
    pub credentials: AwsCredentialsConfig,
    /// Only these clusters (names or ARNs). Empty means every cluster.
    #[serde(default)]
    pub clusters: Vec<String>,
    #[serde(default)]
    pub ecs_endpoint_url: Option<String>,
    #[serde(default)]
    pub ec2_endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CsvSourceConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Relative paths resolve against the source's cache directory.
    pub file: PathBuf,
    pub fields: FieldList,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Column names, either as a TOML list or a comma-separated string.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum FieldList {
    List(Vec<String>),
    Joined(String),
}

impl FieldList {
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::List(list) => list.iter().map(String::as_str).collect(),
            Self::Joined(joined) => joined.split(',').collect(),
        };
        raw.into_iter().map(|f| f.trim().to_string()).collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewRelicSourceConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub account_number: String,
    pub insights_query_api_key: String,
}

/// HTTP proxies applied to every outbound request.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl InventoryConfig {
    pub fn proxies(&self) -> ProxyConfig {
        ProxyConfig {
            http: self.http_proxy.clone(),
            https: self.https_proxy.clone(),
        }
    }

    /// Directory owned exclusively by one source: `<cache_dir>/<type>/<name>`.
    pub fn source_dir(&self, source: &SourceConfig) -> PathBuf {
        self.cache_dir
            .join(source.source_type())
            .join(source.name().unwrap_or("default"))
    }
}

/// `$HOME`, or the current directory when it cannot be determined.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Default config location: `~/.hostbridge/config.toml`.
pub fn default_config_path() -> PathBuf {
    home_dir().join(".hostbridge").join("config.toml")
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.inventory.cache_dir = expand_tilde(&config.inventory.cache_dir);
    for source in &mut config.inventory.sources {
        if let SourceConfig::Csv(csv) = source {
            csv.file = expand_tilde(&csv.file);
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let inventory = &config.inventory;

    if inventory.sources.is_empty() {
        bail!("No inventory source specified: add at least one [[inventory.sources]] entry");
    }

    if inventory.include_pattern.is_some() && inventory.exclude_pattern.is_some() {
        bail!("'exclude_pattern' and 'include_pattern' are mutually exclusive");
    }

    let mut seen = HashSet::new();
    for source in &inventory.sources {
        let key = (source.source_type(), source.effective_name());
        if !seen.insert(key.clone()) {
            bail!(
                "Duplicate {} source named '{}': give each source of the same type a distinct name",
                key.0,
                key.1
            );
        }

        match source {
            SourceConfig::Aws(aws) => {
                if aws.region.trim().is_empty() {
                    bail!("aws source requires a region");
                }
            }
            SourceConfig::Ecs(ecs) => {
                if ecs.region.trim().is_empty() {
                    bail!("ecs source requires a region");
                }
            }
            SourceConfig::Csv(csv) => {
                let fields = csv.fields.names();
                for required in ["name", "address"] {
                    if !fields.iter().any(|f| f == required) {
                        bail!(
                            "csv source fields must include '{}' (got: {})",
                            required,
                            fields.join(", ")
                        );
                    }
                }
            }
            SourceConfig::Newrelic(nr) => {
                if nr.insights_query_api_key.trim().is_empty()
                    || nr.insights_query_api_key == API_KEY_PLACEHOLDER
                {
                    bail!("New Relic inventory selected but no API key was specified");
                }
                if nr.account_number.trim().is_empty() {
                    bail!("New Relic inventory requires an account_number");
                }
            }
        }
    }

    Ok(())
}

/// Commented starting point written by `hostbridge init`.
pub const SAMPLE_CONFIG: &str = r#"# hostbridge configuration

[inventory]
# cache_dir = "~/.hostbridge/inventory"
# include_pattern = "prod-.*"      # mutually exclusive with exclude_pattern
# exclude_pattern = "scratch-.*"
update_at_start = false
fuzzy = false
# http_proxy = "http://proxy.internal:3128"
# https_proxy = "http://proxy.internal:3128"

# A flat file of hosts. Relative paths resolve against
# <cache_dir>/csv/<name>/ (here: <cache_dir>/csv/default/hosts.csv).
[[inventory.sources]]
type = "csv"
file = "hosts.csv"
fields = "name, address, notes"
delimiter = "|"

# EC2 instances. Credentials fall back to AWS_* environment variables.
# [[inventory.sources]]
# type = "aws"
# name = "prod"
# region = "us-west-2"
# access_key_id = "ACCESS_KEY"
# secret_access_key = "SECRET_KEY"

# ECS tasks, joined to the EC2 hosts they run on.
# [[inventory.sources]]
# type = "ecs"
# name = "prod"
# region = "us-west-2"
# clusters = ["web"]

# New Relic infrastructure samples.
# [[inventory.sources]]
# type = "newrelic"
# account_number = "ACCOUNT_NUMBER"
# insights_query_api_key = "API_KEY"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
[inventory]
cache_dir = "/tmp/hb-cache"
include_pattern = "test.*"
fuzzy = true

[[inventory.sources]]
type = "aws"
name = "prod"
region = "us-west-2"
access_key_id = "AKID"
secret_access_key = "SECRET"

[[inventory.sources]]
type = "aws"
name = "staging"
region = "us-east-1"

[[inventory.sources]]
type = "csv"
file = "hosts.csv"
fields = " name,address, random "
delimiter = " | "

[[inventory.sources]]
type = "newrelic"
account_number = "12345"
insights_query_api_key = "NRIQ-abc"

[[inventory.sources]]
type = "ecs"
region = "us-west-2"
clusters = ["web"]
"#,
        )
        .unwrap();

        let inv = &config.inventory;
        assert_eq!(inv.cache_dir, PathBuf::from("/tmp/hb-cache"));
        assert!(inv.fuzzy);
        assert!(!inv.update_at_start);
        assert_eq!(inv.sources.len(), 5);

        match &inv.sources[0] {
            SourceConfig::Aws(aws) => {
                assert_eq!(aws.name.as_deref(), Some("prod"));
                assert_eq!(aws.credentials.access_key_id.as_deref(), Some("AKID"));
                assert_eq!(aws.credentials.session_token, None);
            }
            other => panic!("expected aws, got {:?}", other),
        }
        match &inv.sources[2] {
            SourceConfig::Csv(csv) => {
                assert_eq!(csv.fields.names(), vec!["name", "address", "random"]);
                assert_eq!(csv.delimiter, " | ");
            }
            other => panic!("expected csv, got {:?}", other),
        }
        assert_eq!(
            inv.source_dir(&inv.sources[4]),
            PathBuf::from("/tmp/hb-cache/ecs/default")
        );
        assert_eq!(
            inv.source_dir(&inv.sources[1]),
            PathBuf::from("/tmp/hb-cache/aws/staging")
        );
    }

    #[test]
    fn test_fields_as_list() {
        let config = parse_config(
            r#"
[inventory]
[[inventory.sources]]
type = "csv"
file = "/srv/hosts.csv"
fields = ["name", "address"]
"#,
        )
        .unwrap();
        match &config.inventory.sources[0] {
            SourceConfig::Csv(csv) => {
                assert_eq!(csv.fields.names(), vec!["name", "address"]);
                assert_eq!(csv.delimiter, ",");
            }
            other => panic!("expected csv, got {:?}", other),
        }
    }

    #[test]
    fn test_include_and_exclude_conflict() {
        let err = parse_config(
            r#"
[inventory]
include_pattern = "a"
exclude_pattern = "b"
[[inventory.sources]]
type = "aws"
region = "us-west-2"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_no_sources() {
        let err = parse_config("[inventory]\n").unwrap_err();
        assert!(err.to_string().contains("No inventory source"));
    }

    #[test]
    fn test_placeholder_api_key_rejected() {
        let err = parse_config(
            r#"
[inventory]
[[inventory.sources]]
type = "newrelic"
account_number = "1"
insights_query_api_key = "API_KEY"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }

    #[test]
    fn test_duplicate_source_names_rejected() {
        let err = parse_config(
            r#"
[inventory]
[[inventory.sources]]
type = "aws"
region = "us-west-2"
[[inventory.sources]]
type = "aws"
region = "us-east-1"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate aws source"));
    }

    #[test]
    fn test_unnamed_newrelic_sources_keyed_by_account() {
        let two_accounts = r#"
[inventory]
[[inventory.sources]]
type = "newrelic"
account_number = "111"
insights_query_api_key = "NRIQ-a"
[[inventory.sources]]
type = "newrelic"
account_number = "222"
insights_query_api_key = "NRIQ-b"
"#;
        let config = parse_config(two_accounts).unwrap();
        let names: Vec<String> = config
            .inventory
            .sources
            .iter()
            .map(SourceConfig::effective_name)
            .collect();
        assert_eq!(names, vec!["acct:111", "acct:222"]);

        let err = parse_config(&two_accounts.replace("\"222\"", "\"111\"")).unwrap_err();
        assert!(err.to_string().contains("Duplicate newrelic source named 'acct:111'"));
    }

    #[test]
    fn test_csv_requires_name_and_address() {
        let err = parse_config(
            r#"
[inventory]
[[inventory.sources]]
type = "csv"
file = "hosts.csv"
fields = "host, ip"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn test_unknown_source_type() {
        assert!(parse_config(
            r#"
[inventory]
[[inventory.sources]]
type = "gcp"
project = "x"
"#,
        )
        .is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        let expanded = expand_tilde(Path::new("~/inventory"));
        assert_eq!(expanded, home_dir().join("inventory"));
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = parse_config(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.inventory.sources.len(), 1);
        assert_eq!(config.inventory.sources[0].source_type(), "csv");
    }
}
