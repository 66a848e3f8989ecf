//! Drive the `hostbridge` binary against a temporary config and cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const EC2_FIXTURE: &str = include_str!("fixtures/aws/ec2-describe-instances.json");
const CSV_FIXTURE: &str = include_str!("fixtures/csv/hosts.csv");

fn hostbridge_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_hostbridge"))
}

/// Config with one aws source (pre-seeded cache) and one flat file.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let cache = root.join("inventory");
    let aws_dir = cache.join("aws").join("default");
    fs::create_dir_all(&aws_dir).unwrap();
    fs::write(aws_dir.join("ec2-describe-instances.json"), EC2_FIXTURE).unwrap();

    let csv_file = root.join("hosts.csv");
    fs::write(&csv_file, CSV_FIXTURE).unwrap();

    let config = format!(
        r#"[inventory]
cache_dir = "{}"

[[inventory.sources]]
type = "aws"
region = "us-west-2"

[[inventory.sources]]
type = "csv"
name = "lab"
file = "{}"
fields = "name, address, random"
delimiter = "|"
"#,
        cache.display(),
        csv_file.display()
    );
    let config_path = root.join("config.toml");
    fs::write(&config_path, config).unwrap();
    (tmp, config_path)
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(hostbridge_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run hostbridge")
}

#[test]
fn test_list_prints_every_source() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["list"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 13);
    assert!(stdout.contains("devlab-forms"));
    assert!(stdout.contains("testenv-formsvc"));
    assert!(stdout.contains("lab (csv)"));
}

#[test]
fn test_list_single_source_as_json() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["list", "--source", "lab", "--json"]);
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert!(items.iter().all(|i| i["source"] == "lab (csv)"));
}

#[test]
fn test_search_finds_host() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["search", "test-game", "--json"]);
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "test-game-svc");
    assert_eq!(items[0]["address"], "devbox");
}

#[test]
fn test_search_without_match_fails() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["search", "no-such-host"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Could not find matching host(s) for: no-such-host"));
}

#[test]
fn test_missing_cache_fails() {
    let (tmp, config) = setup_test_env();
    fs::remove_file(tmp.path().join("inventory/aws/default/ec2-describe-instances.json")).unwrap();
    let output = run(&config, &["list"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("update"));
}

#[test]
fn test_list_selected_source_ignores_other_missing_cache() {
    let (tmp, config) = setup_test_env();
    fs::remove_file(tmp.path().join("inventory/aws/default/ec2-describe-instances.json")).unwrap();
    let output = run(&config, &["list", "--source", "lab"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 5);
}

#[test]
fn test_sources_lists_cache_state() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["sources"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("aws"));
    assert!(stdout.contains("lab (csv)"));
    assert!(stdout.contains("OK"));
}

#[test]
fn test_init_writes_sample_config() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("nested").join("config.toml");
    let init = || {
        Command::new(hostbridge_binary())
            .arg("--config")
            .arg(&config)
            .arg("init")
            .env("HOME", tmp.path())
            .output()
            .expect("failed to run hostbridge")
    };

    let output = init();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(config.exists());
    assert!(tmp.path().join(".hostbridge/inventory/csv/default").is_dir());

    let again = init();
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("already exists"));
}
