//! Integration tests for the engine config
//!
//! Tests loading, policy effects on indexing and validation, and the
//! `--config` / environment variable precedence of the CLI.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use strategy_patcher::config::{load_from_path, load_from_str, ConfigError};
use strategy_patcher::{apply_edits, build_index, Edit, ErrorKind, TargetDescriptor};
use tempfile::TempDir;

const STRATEGY: &str = r#"class Helper:
    pass


class Tuned(BaseStrategy):
    stoploss = -0.05
    timeframe = "5m"
    buy_rsi = IntParam(10, 40, default=30, space="buy")

    def compute_indicators(self, dataframe):
        return dataframe

    def populate_indicators(self, dataframe):
        return dataframe
"#;

const CUSTOM: &str = r#"
[strategy]
base_classes = ["BaseStrategy"]
indicators_method = "compute_indicators"

[params]
constructor_marker = "Param"
mutable_keywords = ["default", "space"]

[attrs]
whitelist = ["stoploss", "timeframe"]
"#;

/// Helper to create a temp dir with a strategy and a config file
fn setup_workspace() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let strategy = dir.path().join("tuned.py");
    fs::write(&strategy, STRATEGY).unwrap();
    let config = dir.path().join("engine.toml");
    fs::write(&config, CUSTOM).unwrap();
    (dir, strategy, config)
}

#[test]
fn test_custom_policy_changes_index() {
    let config = load_from_str(CUSTOM).unwrap();
    let index = build_index(STRATEGY, &config).unwrap();

    assert_eq!(index.primary_class().unwrap().name, "Tuned");
    let attrs: Vec<_> = index.attrs.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(attrs, vec!["stoploss", "timeframe"]);
    assert_eq!(index.params.len(), 1);
    assert_eq!(index.params[0].constructor, "IntParam");
}

#[test]
fn test_default_policy_falls_back_to_first_class() {
    let index = build_index(STRATEGY, &Default::default()).unwrap();
    assert_eq!(index.primary_class().unwrap().name, "Helper");
    assert!(index.attrs.is_empty());
    assert!(index.params.is_empty());
}

#[test]
fn test_mutable_keywords_widen_param_changes() {
    let config = load_from_str(CUSTOM).unwrap();
    let edit = Edit::replace(
        TargetDescriptor::param("buy_rsi"),
        "    buy_rsi = IntParam(10, 40, default=30, space=\"buy\")\n",
        "    buy_rsi = IntParam(10, 40, default=20, space=\"sell\")\n",
    );
    let outcome = apply_edits(STRATEGY, &[edit.clone()], &config).unwrap();
    assert!(outcome.content.contains("default=20, space=\"sell\""));

    let mut strict = config.clone();
    strict.params.mutable_keywords = vec!["default".into()];
    let err = apply_edits(STRATEGY, &[edit], &strict).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsafeEdit);
}

#[test]
fn test_heuristic_anchor_uses_configured_method() {
    let config = load_from_str(CUSTOM).unwrap();
    let edit = Edit::insert(
        strategy_patcher::AnchorDescriptor::HeuristicIndicatorsEnd,
        "        # marker\n",
    );
    let outcome = apply_edits(STRATEGY, &[edit], &config).unwrap();
    assert!(outcome
        .content
        .contains("    def compute_indicators(self, dataframe):\n        return dataframe\n        # marker\n"));
}

#[test]
fn test_load_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[attrs]\nwhitelist = [\"not valid\"]\n").unwrap();
    assert!(matches!(load_from_path(&path), Err(ConfigError::Validation { .. })));

    assert!(matches!(
        load_from_path(dir.path().join("missing.toml")),
        Err(ConfigError::Io { .. })
    ));
}

fn attrs_via_cli(strategy: &Path, config_flag: Option<&Path>, config_env: Option<&Path>) -> Value {
    let mut command = Command::new(env!("CARGO_BIN_EXE_strategy-patcher"));
    command.env_remove("STRATEGY_PATCHER_CONFIG").env_remove("RUST_LOG");
    if let Some(path) = config_flag {
        command.arg("--config").arg(path);
    }
    if let Some(path) = config_env {
        command.env("STRATEGY_PATCHER_CONFIG", path);
    }
    let output = command.args(["attrs", "extract"]).arg(strategy).output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_cli_config_sources() {
    let (dir, strategy, config) = setup_workspace();

    let from_flag = attrs_via_cli(&strategy, Some(&config), None);
    assert_eq!(from_flag["attrs"][1]["name"], "timeframe");
    assert_eq!(from_flag["attrs"][1]["value"], json!("5m"));

    let from_env = attrs_via_cli(&strategy, None, Some(&config));
    assert_eq!(from_env, from_flag);

    // the flag wins over the environment
    let defaults = dir.path().join("defaults.toml");
    fs::write(&defaults, "").unwrap();
    let flag_over_env = attrs_via_cli(&strategy, Some(&defaults), Some(&config));
    assert_eq!(flag_over_env, json!({"attrs": []}));
}

#[test]
fn test_cli_invalid_config() {
    let (dir, strategy, _config) = setup_workspace();
    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[params]\nunknown = 1\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_strategy-patcher"))
        .env_remove("STRATEGY_PATCHER_CONFIG")
        .arg("--config")
        .arg(&broken)
        .args(["index"])
        .arg(&strategy)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("config-error"));
}
