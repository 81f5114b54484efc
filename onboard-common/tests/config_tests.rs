//! Tests for config file resolution and environment helpers
//!
//! Uses serial_test because these tests manipulate process environment variables.

use onboard_common::config::{env_parse, env_string, load_toml, resolve_config_path};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
struct SampleConfig {
    #[serde(default)]
    bind: Option<String>,
    #[serde(default)]
    batch_size: Option<usize>,
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    env::set_var("ONBOARD_TEST_CONFIG", "/tmp/from-env.toml");
    let path = resolve_config_path(None, "ONBOARD_TEST_CONFIG", "onboard-test");
    env::remove_var("ONBOARD_TEST_CONFIG");

    assert_eq!(path, Some(PathBuf::from("/tmp/from-env.toml")));
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    env::set_var("ONBOARD_TEST_CONFIG", "/tmp/from-env.toml");
    let cli = PathBuf::from("/tmp/from-cli.toml");
    let path = resolve_config_path(Some(&cli), "ONBOARD_TEST_CONFIG", "onboard-test");
    env::remove_var("ONBOARD_TEST_CONFIG");

    assert_eq!(path, Some(cli));
}

#[test]
#[serial]
fn test_blank_env_var_is_unset() {
    env::set_var("ONBOARD_TEST_BLANK", "   ");
    assert_eq!(env_string("ONBOARD_TEST_BLANK"), None);
    env::remove_var("ONBOARD_TEST_BLANK");
}

#[test]
#[serial]
fn test_env_parse_reports_bad_values() {
    env::set_var("ONBOARD_TEST_NUMBER", "ten");
    let result = env_parse::<u64>("ONBOARD_TEST_NUMBER");
    env::remove_var("ONBOARD_TEST_NUMBER");
    assert!(result.is_err());

    env::set_var("ONBOARD_TEST_NUMBER", "10");
    let result = env_parse::<u64>("ONBOARD_TEST_NUMBER").unwrap();
    env::remove_var("ONBOARD_TEST_NUMBER");
    assert_eq!(result, Some(10));
}

#[test]
fn test_load_toml_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.toml");
    std::fs::write(&path, "bind = \"0.0.0.0:8080\"\nbatch_size = 10\n").unwrap();

    let cfg: SampleConfig = load_toml(Some(&path)).unwrap();
    assert_eq!(cfg.bind.as_deref(), Some("0.0.0.0:8080"));
    assert_eq!(cfg.batch_size, Some(10));
}

#[test]
fn test_load_toml_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.toml");
    std::fs::write(&path, "bind = [unterminated").unwrap();

    let result: onboard_common::Result<SampleConfig> = load_toml(Some(&path));
    assert!(result.is_err());
}
