//! Integration tests for the secretscan CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn scan_cmd() -> Command {
    let mut cmd = Command::cargo_bin("secretscan").unwrap();
    // Keep each test's cache inside its own sandbox.
    cmd.env_remove("SECRETSCAN_CACHE__DIRECTORY");
    cmd
}

/// Test CLI binary exists and responds to --help
#[test]
fn test_cli_help() {
    scan_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("secret detection"));
}

/// Test CLI responds to --version
#[test]
fn test_cli_version() {
    scan_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("secretscan"));
}

/// Test --list-rules prints the built-in catalog
#[test]
fn test_list_rules() {
    scan_cmd()
        .arg("--list-rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("stripe-api-key"))
        .stdout(predicate::str::contains("private-key"));
}

/// A clean tree exits 0 and reports no findings
#[test]
fn test_clean_tree_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("main.rs"), "fn main() {}\n").unwrap();

    scan_cmd()
        .current_dir(temp_dir.path())
        .arg("--no-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("No secrets found"));
}

/// A planted test credential is found and flips the exit code to 1
#[test]
fn test_planted_secret_found() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.env"),
        "API_KEY=sk_test_12345\n",
    )
    .unwrap();

    scan_cmd()
        .current_dir(temp_dir.path())
        .arg("--no-cache")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Found 1 potential secret"))
        .stdout(predicate::str::contains("Stripe API Key"));
}

/// JSON output is valid and carries the finding fields
#[test]
fn test_json_output() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.env"),
        "API_KEY=sk_test_12345\n",
    )
    .unwrap();

    let output = scan_cmd()
        .current_dir(temp_dir.path())
        .args(["--no-cache", "--format", "json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let doc: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let findings = doc["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["rule_id"], "stripe-api-key");
    assert_eq!(findings[0]["matched_text"], "sk_test_12345");
    assert_eq!(findings[0]["line"], 1);
    assert_eq!(doc["stats"]["total_findings"], 1);
}

/// A rescan is answered from the result cache with identical findings
#[test]
fn test_rescan_uses_cache() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.env"),
        "API_KEY=sk_test_12345\n",
    )
    .unwrap();

    scan_cmd()
        .current_dir(temp_dir.path())
        .assert()
        .code(1);
    assert!(temp_dir.path().join(".secretscan/cache.json").exists());

    scan_cmd()
        .current_dir(temp_dir.path())
        .arg("--stats")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Found 1 potential secret"))
        .stdout(predicate::str::contains("Cache statistics"));
}

/// Ignore patterns exclude files from the scan
#[test]
fn test_ignore_patterns() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.env"),
        "API_KEY=sk_test_12345\n",
    )
    .unwrap();

    scan_cmd()
        .current_dir(temp_dir.path())
        .args(["--no-cache", "--ignore", "*.env"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No secrets found"));
}

/// Scanning a single file works the same as scanning a tree
#[test]
fn test_scan_single_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("config.env");
    fs::write(&file, "API_KEY=sk_test_12345\n").unwrap();

    scan_cmd()
        .current_dir(temp_dir.path())
        .args(["--no-cache", "config.env"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Found 1 potential secret"));
}

/// A missing scan target is a hard error (exit 2), not an empty result
#[test]
fn test_missing_target_fails() {
    scan_cmd()
        .args(["--no-cache", "/no/such/path"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot stat scan target"));
}
