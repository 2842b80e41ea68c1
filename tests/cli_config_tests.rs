//! End-to-end tests for `lazykarabiner config`.

mod fixtures;
use fixtures::*;

use serde_json::Value;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_config(config: &std::path::Path, args: &[&str]) -> Output {
    Command::new(lazykarabiner_bin())
        .arg("config")
        .args(args)
        .arg("--config")
        .arg(config)
        .env_remove("LAZYKARABINER_CONFIG")
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_config_show_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");

    let output = run_config(&config, &["show", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let result: Value = serde_json::from_slice(&output.stdout).expect("Should parse JSON output");
    assert_eq!(result["target"]["profile"], 0);
    assert_eq!(result["target"]["rule"], 0);
    assert_eq!(result["splice"]["strict_ordering"], true);
}

#[test]
fn test_config_init_and_force() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("nested").join("config.toml");

    assert_eq!(run_config(&config, &["init"]).status.code(), Some(0));
    assert!(config.exists());

    assert_eq!(run_config(&config, &["init"]).status.code(), Some(2));
    assert_eq!(run_config(&config, &["init", "--force"]).status.code(), Some(0));
}

#[test]
fn test_config_set_and_show() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");

    let output = run_config(
        &config,
        &[
            "set",
            "--layer-spec",
            "/tmp/layers.toml",
            "--profile",
            "1",
            "--rule",
            "Layers",
            "--prune-orphans",
            "false",
        ],
    );
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = run_config(&config, &["show", "--json"]);
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["paths"]["layer_spec"], "/tmp/layers.toml");
    assert_eq!(result["target"]["profile"], 1);
    assert_eq!(result["target"]["rule"], "Layers");
    assert_eq!(result["splice"]["prune_orphans"], false);

    let output = run_config(&config, &["show"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("/tmp/layers.toml"));
    assert!(!stdout.contains("No layer spec set"));
}

#[test]
fn test_config_show_hints_when_unconfigured() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");

    let output = run_config(&config, &["show"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No layer spec set"));
    assert!(stdout.contains("config set --layer-spec FILE"));
}

#[test]
fn test_config_set_requires_an_option() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");

    let output = run_config(&config, &["set"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!config.exists());
}

#[test]
fn test_config_set_rejects_unknown_spec_format() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");

    let output = run_config(&config, &["set", "--layer-spec", "layers.ini"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_config_path() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");

    let output = run_config(&config, &["path"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("config.toml"));
}

#[test]
fn test_malformed_config_exits_with_2() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    std::fs::write(&ws.config, "[paths\n").unwrap();

    let output = ws.run(&["apply"]);
    assert_eq!(output.status.code(), Some(2));
}
