//! Integration tests for the `tandem` binary.
//!
//! Everything runs with `--mock`, against an in-memory control plane, with
//! HOME and the working directory pointed at a scratch directory so no real
//! config file is picked up.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tandem(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tandem").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env_remove("TANDEM_API_KEY")
        .env_remove("TANDEM_ACCOUNT_ID")
        .env_remove("TANDEM_BASE_URL")
        .env_remove("TANDEM_EXTRA_HEADERS");
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON")
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("trainer"))
        .stdout(predicate::str::contains("deployment"))
        .stdout(predicate::str::contains("hotload"))
        .stdout(predicate::str::contains("up"));
}

#[test]
fn test_trainer_create_json() {
    let home = TempDir::new().unwrap();
    let assert = tandem(&home)
        .args(["--mock", "trainer", "create", "--base-model", "qwen3-8b", "--job-id", "policy-1", "--json"])
        .assert()
        .success();

    let json = stdout_json(assert.get_output());
    assert_eq!(json["job_id"], "policy-1");
    assert_eq!(json["base_url"], "http://policy-1.trainer.mock:8080");
}

#[test]
fn test_trainer_create_human_output() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .args(["--mock", "trainer", "create", "--base-model", "qwen3-8b", "--job-id", "policy-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trainer ready"))
        .stdout(predicate::str::contains("policy-1"));
}

#[test]
fn test_trainer_create_uses_configured_base_model() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".tandemrc"), "base_model = \"from-config\"\n").unwrap();

    tandem(&home).args(["--mock", "trainer", "create", "--no-wait", "--json"]).assert().success();
}

#[test]
fn test_trainer_create_without_base_model_fails() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .args(["--mock", "trainer", "create"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No base model given"));
}

#[test]
fn test_trainer_status_unknown_job_fails() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .args(["--mock", "trainer", "status", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_deployment_up_json() {
    let home = TempDir::new().unwrap();
    let assert = tandem(&home)
        .args(["--mock", "deployment", "up", "serve-1", "--base-model", "qwen3-8b", "--json"])
        .assert()
        .success();

    let json = stdout_json(assert.get_output());
    assert_eq!(json["deployment_id"], "serve-1");
    assert_eq!(json["state"], "READY");
}

#[test]
fn test_deployment_up_rejects_bad_replica_range() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .args(["--mock", "deployment", "up", "serve-1", "--base-model", "m", "--min-replicas", "3", "--max-replicas", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min replica count"));
}

#[test]
fn test_hotload_push_json() {
    let home = TempDir::new().unwrap();
    let assert = tandem(&home)
        .args(["--mock", "hotload", "serve-1", "step-2", "--previous", "step-1", "--model", "qwen3-8b", "--json"])
        .assert()
        .success();

    let json = stdout_json(assert.get_output());
    assert_eq!(json["snapshot"], "step-2");
    assert_eq!(json["delta"], true);
    assert_eq!(json["loaded"], true);
}

#[test]
fn test_hotload_without_snapshot_fails() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .args(["--mock", "hotload", "serve-1", "--model", "m"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: tandem hotload"));
}

#[test]
fn test_hotload_status_reports_scaling_up() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .args(["--mock", "hotload", "status", "serve-1", "--model", "m"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No replicas reported yet"));
}

#[test]
fn test_up_provisions_everything() {
    let home = TempDir::new().unwrap();
    let assert = tandem(&home)
        .args(["--mock", "up", "--base-model", "qwen3-8b", "--reference", "--deployment", "serve-1", "--json"])
        .assert()
        .success();

    let json = stdout_json(assert.get_output());
    assert!(json["policy"]["base_url"].is_string());
    assert!(json["reference"]["base_url"].is_string());
    assert_ne!(json["policy"]["job_id"], json["reference"]["job_id"]);
    assert_eq!(json["deployment"]["deployment_id"], "serve-1");
}

#[test]
fn test_config_file_forces_json() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".tandemrc"), "[output]\njson = true\n").unwrap();

    let assert = tandem(&home)
        .args(["--mock", "deployment", "up", "serve-1", "--base-model", "m"])
        .assert()
        .success();
    assert!(stdout_json(assert.get_output()).is_object());
}

#[test]
fn test_missing_credentials_without_mock() {
    let home = TempDir::new().unwrap();
    tandem(&home)
        .args(["--account", "acme", "trainer", "status", "policy-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TANDEM_API_KEY"));
}
