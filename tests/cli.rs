//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Write a config file into `dir` and return its path
fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn innovator(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("innovator").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn test_dispatch_command_help() {
    let mut cmd = Command::cargo_bin("innovator").unwrap();
    cmd.arg("dispatch").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Dispatch a single task"));
}

#[test]
fn test_agents_lists_builtin_handlers() {
    let mut cmd = Command::cargo_bin("innovator").unwrap();
    cmd.arg("agents");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("generalist"))
        .stdout(predicate::str::contains("film"))
        .stdout(predicate::str::contains("stage, summary"));
}

#[test]
fn test_dispatch_json_accepts_confident_handler() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[router]\ninvocation_timeout_ms = 5000\n");

    let output = innovator(&config)
        .arg("dispatch")
        .arg("Storyboard the camera shot with moody lighting")
        .arg("--domain")
        .arg("film")
        .arg("--threshold")
        .arg("0.5")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["outcome"], "accept");
    assert_eq!(record["domain"], "film");
    assert_eq!(record["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(record["attempts"][0]["descriptor"]["id"], "film");
}

#[test]
fn test_dispatch_reject_still_succeeds() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let output = innovator(&config)
        .args(["dispatch", "nothing relevant here", "--domain", "game", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["outcome"], "reject");
    assert_eq!(record["exhausted_by"], "candidates_exhausted");
    let ids: Vec<&str> = record["attempts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["descriptor"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["game", "generalist"]);
}

#[test]
fn test_dispatch_table_output() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    innovator(&config)
        .args(["dispatch", "Plan the opening sequence", "--domain", "planner"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dispatch task_"))
        .stdout(predicate::str::contains("accept"));
}

#[test]
fn test_dispatch_rejects_unknown_domain() {
    let mut cmd = Command::cargo_bin("innovator").unwrap();
    cmd.args(["dispatch", "sculpt a statue", "--domain", "sculpture"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("sculpture"));
}

#[test]
fn test_dispatch_rejects_out_of_range_threshold() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    innovator(&config)
        .args(["dispatch", "npc quest", "--domain", "game", "--threshold", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("accept_threshold"));
}

#[test]
fn test_dispatch_writes_audit_log() {
    let tmp = TempDir::new().unwrap();
    let audit_dir = tmp.path().join("audit");
    let config = write_config(
        tmp.path(),
        &format!("[audit]\nenabled = true\ndir = {:?}\n", audit_dir),
    );

    innovator(&config)
        .args(["dispatch", "keyframe the character rig", "--domain", "animation"])
        .assert()
        .success();

    let log = std::fs::read_to_string(audit_dir.join("dispatch.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("\"domain\":\"animation\""));
}

#[test]
fn test_pipeline_json_completes() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let output = innovator(&config)
        .args([
            "pipeline",
            "Storyboard a cinematic camera shot of the scene",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let run: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(run["status"], "completed");
    let stages: Vec<&str> = run["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["record"]["domain"].as_str().unwrap())
        .collect();
    assert_eq!(stages, vec!["planner", "director", "film", "render"]);
}

#[test]
fn test_config_show_path() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    innovator(&config)
        .args(["config", "--show-path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_prints_effective_values() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[router]\naccept_threshold = 0.75\n");

    innovator(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("accept_threshold = 0.75"))
        .stdout(predicate::str::contains("[retry]"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[router]\naccept_threshold = 3.0\n");

    innovator(&config)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("accept_threshold"));
}
