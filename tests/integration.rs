//! Integration tests for the bansync binary.
//!
//! None of these need a database; commands that would connect are only
//! exercised up to configuration loading.

use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bansync"))
}

fn run_bansync(args: &[&str]) -> std::process::Output {
    Command::new(binary_path())
        .args(args)
        .output()
        .expect("Failed to execute bansync")
}

#[test]
fn test_version_command() {
    let output = run_bansync(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bansync"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_command() {
    let output = run_bansync(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "sync", "check", "convert", "init"] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_convert_command() {
    let output = run_bansync(&["convert", "76561197960265729"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "STEAM_0:1:0");

    let output = run_bansync(&["convert", "STEAM_0:0:1"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "76561197960265730"
    );
}

#[test]
fn test_convert_rejects_invalid_input() {
    let output = run_bansync(&["convert", "not-an-id"]);
    assert!(!output.status.success());
}

#[test]
fn test_init_then_refuse_overwrite() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.yaml");
    let config = config.to_str().unwrap();

    let output = run_bansync(&["init", "--config", config]);
    assert!(output.status.success());
    let content = std::fs::read_to_string(config).unwrap();
    assert!(content.contains("ban_file"));
    assert!(content.contains("server_id"));

    let output = run_bansync(&["init", "--config", config]);
    assert!(!output.status.success());

    let output = run_bansync(&["init", "--force", "--config", config]);
    assert!(output.status.success());
}

#[test]
fn test_sync_without_database_url_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.yaml");
    let config = config.to_str().unwrap();
    assert!(run_bansync(&["init", "--config", config]).status.success());

    let output = Command::new(binary_path())
        .args(["sync", "--config", config])
        .env_remove("BANSYNC_DATABASE_URL")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.to_lowercase().contains("database"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let output = run_bansync(&["check", "--config", "/nonexistent/bansync/config.yaml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config"));
}
