use std::path::{Path, PathBuf};

use stackgen_core::{NetworkConfig, StackConfig};
use tempfile::TempDir;

#[test]
fn load_returns_defaults_when_no_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = StackConfig::load(tmp.path()).unwrap();

    assert_eq!(config.stack.name, "stack");
    assert!(config.stack.templates_dir.is_none());
    assert_eq!(config.stack.output_dir, PathBuf::from("build"));
    assert_eq!(config.stack.options_file, PathBuf::from("build-options.toml"));
    assert!(!config.engine.fail_fast);
    assert_eq!(config.engine.service_timeout_secs, 30);
    assert!(config.engine.archive);
    assert!(config.networks.is_empty());
}

#[test]
fn load_parses_full_config() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[stack]
name = "iotstack"
templates_dir = ".templates"
output_dir = "out"
options_file = "options.json"

[engine]
fail_fast = true
service_timeout_secs = 5
archive = false

[networks.iotstack_nw]
driver = "bridge"

[networks.proxy]
driver = "overlay"
external = true
"#;
    std::fs::write(tmp.path().join("stackgen.toml"), toml).unwrap();

    let config = StackConfig::load(tmp.path()).unwrap();

    assert_eq!(config.stack.name, "iotstack");
    assert_eq!(config.stack.templates_dir, Some(PathBuf::from(".templates")));
    assert_eq!(config.stack.output_dir, PathBuf::from("out"));
    assert_eq!(config.stack.options_file, PathBuf::from("options.json"));
    assert!(config.engine.fail_fast);
    assert_eq!(config.engine.service_timeout_secs, 5);
    assert!(!config.engine.archive);
    assert_eq!(config.networks["iotstack_nw"], NetworkConfig::default());
    assert_eq!(
        config.networks["proxy"],
        NetworkConfig {
            driver: "overlay".to_owned(),
            external: true,
        }
    );
}

#[test]
fn load_partial_config_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[engine]
fail_fast = true
"#;
    std::fs::write(tmp.path().join("stackgen.toml"), toml).unwrap();

    let config = StackConfig::load(tmp.path()).unwrap();

    assert!(config.engine.fail_fast);
    // Defaults preserved
    assert_eq!(config.engine.service_timeout_secs, 30);
    assert!(config.engine.archive);
    assert_eq!(config.stack.name, "stack");
}

#[test]
fn load_network_without_driver_defaults_to_bridge() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("stackgen.toml"), "[networks.lan]\n").unwrap();

    let config = StackConfig::load(tmp.path()).unwrap();
    assert_eq!(config.networks["lan"].driver, "bridge");
    assert!(!config.networks["lan"].external);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("stackgen.toml"), "not valid {{{{ toml").unwrap();

    let result = StackConfig::load(tmp.path());
    assert!(result.is_err());

    let err = result.unwrap_err().to_string();
    assert!(err.contains("parse"));
}

#[test]
fn load_empty_config_returns_defaults() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("stackgen.toml"), "").unwrap();

    let config = StackConfig::load(tmp.path()).unwrap();
    assert_eq!(config.stack.name, "stack");
}

#[test]
fn templates_dir_resolves_against_project_dir() {
    let mut config = StackConfig::default();
    assert!(config.templates_dir(Path::new("/srv/stack")).is_none());

    config.stack.templates_dir = Some(PathBuf::from(".templates"));
    assert_eq!(
        config.templates_dir(Path::new("/srv/stack")),
        Some(PathBuf::from("/srv/stack/.templates"))
    );
}
