//! CLI tests for the `pl` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const QUICK_CONFIG: &str = r#"
preloader:
  removal-delay-ms: 10

boot:
  requested-autoload: Town
  phase: autoload

plugins:
  - name: Roads
    version: 2
    operations:
      - name: Build graph
        kind: future
        duration-ms: 200
      - name: Bake lanes
        kind: sequence
        duration-ms: 200
        steps: 2
"#;

const FAILING_CONFIG: &str = r#"
boot:
  requested-autoload: Town
  phase: autoload

plugins:
  - name: Roads
    version: 1
    operations:
      - name: Build graph
        kind: handle
        duration-ms: 200
        fail: true
"#;

/// `pl` isolated from the user's home, config dir and working directory
fn pl(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pl").expect("binary exists");
    cmd.current_dir(temp.path())
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("XDG_DATA_HOME", temp.path().join("data"))
        .arg("--stderr")
        .arg("--log-level")
        .arg("error");
    cmd
}

fn write_config(temp: &TempDir, content: &str) -> String {
    let path = temp.path().join("pl.yml");
    fs::write(&path, content).expect("Failed to write config");
    path.display().to_string()
}

#[test]
fn test_version() {
    let temp = TempDir::new().unwrap();
    pl(&temp).arg("--version").assert().success().stdout(predicate::str::contains("pl"));
}

#[test]
fn test_show_config_defaults() {
    let temp = TempDir::new().unwrap();
    pl(&temp)
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("removal-delay-ms: 2000"))
        .stdout(predicate::str::contains("Better Textures"));
}

#[test]
fn test_show_config_from_file() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, QUICK_CONFIG);
    pl(&temp)
        .args(["show-config", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("Build graph"))
        .stdout(predicate::str::contains("removal-delay-ms: 10"));
}

#[test]
fn test_run_json_resumes_autoload() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, QUICK_CONFIG);
    pl(&temp)
        .args(["run", "--format", "json", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""loaded": "Town""#))
        .stdout(predicate::str::contains(r#""event": "resumed""#));
}

#[test]
fn test_run_text_summary() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, QUICK_CONFIG);
    pl(&temp)
        .args(["run", "--quiet", "--autoload", "Village", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("Operations: 2 (0 failed)"))
        .stdout(predicate::str::contains("Loaded: Village"));
}

#[test]
fn test_run_failure_exits_nonzero() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, FAILING_CONFIG);
    pl(&temp)
        .args(["run", "--quiet", "--config", &config])
        .assert()
        .failure()
        .stdout(predicate::str::contains("stayed in the main menu"))
        .stderr(predicate::str::contains("1 operation(s) failed to preload"));
}

#[test]
fn test_invalid_format_rejected() {
    let temp = TempDir::new().unwrap();
    pl(&temp)
        .args(["run", "--format", "table"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}
