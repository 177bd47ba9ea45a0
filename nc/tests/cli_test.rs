//! Offline CLI tests for `nc validate`

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `nc` isolated from the user's config and log directories
fn nc(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("nc").expect("nc binary");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_validate_accepts_valid_plan() {
    let home = TempDir::new().expect("Failed to create temp dir");

    nc(home.path())
        .args(["validate", &fixture("nightly_sync.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nightly CRM sync is valid (3 steps, 3 agents)"));
}

#[test]
fn test_validate_rejects_broken_plan() {
    let home = TempDir::new().expect("Failed to create temp dir");

    nc(home.path())
        .args(["validate", &fixture("broken_plan.json")])
        .assert()
        .failure()
        .stdout(predicate::str::contains("is invalid"))
        .stdout(predicate::str::contains("duplicate stepId in this flow"))
        .stdout(predicate::str::contains("agentId 'ghost'"));
}

#[test]
fn test_validate_json_output() {
    let home = TempDir::new().expect("Failed to create temp dir");

    let output = nc(home.path())
        .args(["--format", "json", "validate", &fixture("broken_plan.json")])
        .output()
        .expect("run nc");
    assert!(!output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["valid"], false);
    assert_eq!(report["issues"].as_array().map(Vec::len), Some(3));
}

#[test]
fn test_validate_yaml_file() {
    let home = TempDir::new().expect("Failed to create temp dir");
    let plan = home.path().join("plan.yml");
    fs::write(
        &plan,
        r#"
planId: plan-yaml
metadata:
  name: YAML plan
agents:
  - agentId: worker
    name: Worker
executionFlow:
  type: sequential
  steps:
    - stepId: only
      type: sequential
      agentId: worker
      instruction: do the thing
"#,
    )
    .expect("write plan");

    nc(home.path())
        .arg("validate")
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("YAML plan is valid (1 steps, 1 agents)"));
}

#[test]
fn test_validate_missing_file() {
    let home = TempDir::new().expect("Failed to create temp dir");

    nc(home.path())
        .args(["validate", "does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read does-not-exist.json"));
}
