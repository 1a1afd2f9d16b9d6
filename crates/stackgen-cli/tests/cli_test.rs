use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn stackgen() -> assert_cmd::Command {
    cargo_bin_cmd!("stackgen")
}

// ── Help / Version ──

#[test]
fn shows_help() {
    stackgen()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generate docker-compose stacks"));
}

#[test]
fn shows_version() {
    stackgen()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stackgen"));
}

#[test]
fn build_help_lists_flags() {
    stackgen()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--service"))
        .stdout(predicate::str::contains("--fail-fast"))
        .stdout(predicate::str::contains("--no-archive"))
        .stdout(predicate::str::contains("--strict"));
}

// ── Init Command ──

#[test]
fn init_creates_config_files() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created stackgen.toml"))
        .stdout(predicate::str::contains("Created build-options.toml"));

    let config = std::fs::read_to_string(tmp.path().join("stackgen.toml")).unwrap();
    assert!(config.contains("[stack]"));
    assert!(tmp.path().join("build-options.toml").exists());
}

#[test]
fn init_skips_existing_files() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("stackgen.toml"), "# mine\n").unwrap();

    stackgen()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("stackgen.toml already exists"));

    let config = std::fs::read_to_string(tmp.path().join("stackgen.toml")).unwrap();
    assert_eq!(config, "# mine\n");
}

// ── List Command ──

#[test]
fn list_shows_builtin_and_project_templates() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("stackgen.toml"),
        "[stack]\ntemplates_dir = \"templates\"\n",
    )
    .unwrap();
    let nodered = tmp.path().join("templates/nodered");
    std::fs::create_dir_all(&nodered).unwrap();
    std::fs::write(nodered.join("service.yml"), "image: nodered/node-red\n").unwrap();

    stackgen()
        .current_dir(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("adguardhome"))
        .stdout(predicate::str::contains("pihole"))
        .stdout(predicate::str::is_match(r"nodered\s+template").unwrap());
}

// ── Check Command ──

#[test]
fn check_without_selection_fails() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no services selected"));
}

#[test]
fn check_reports_port_collision() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["check", "--service", "adguardhome", "--service", "pihole"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("host port 53/udp"))
        .stderr(predicate::str::contains("blocking issue"));
}

#[test]
fn check_clean_selection_succeeds() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["check", "-s", "adguardhome", "-s", "mosquitto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No blocking issues"));
}

#[test]
fn missing_options_file_flag_fails() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["check", "--options", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
}

// ── Build Command ──

#[test]
fn build_writes_artifact() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["build", "--service", "mosquitto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Built 1 service(s)"));

    let out = tmp.path().join("build");
    assert!(out.join("docker-compose.yml").exists());
    assert!(out.join("prebuild.sh").exists());
    assert!(out.join("postbuild.sh").exists());
    assert!(out.join("build.zip").exists());
    assert!(out.join("volumes/mosquitto/config/mosquitto.conf").exists());

    let prebuild = std::fs::read_to_string(out.join("prebuild.sh")).unwrap();
    assert!(prebuild.starts_with("#!/bin/sh"));
    assert!(prebuild.contains("mkdir -p './volumes/mosquitto/data'"));
}

#[test]
fn build_uses_options_file_and_out_flag() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("build-options.toml"),
        r#"
selected_services = ["adguardhome"]

[services.adguardhome]
image_tag = "v0.107.0"
"#,
    )
    .unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["build", "--out", "dist", "--no-archive"])
        .assert()
        .success();

    let compose = std::fs::read_to_string(tmp.path().join("dist/docker-compose.yml")).unwrap();
    assert!(compose.contains("adguard/adguardhome:v0.107.0"));
    assert!(!tmp.path().join("dist/build.zip").exists());
}

#[test]
fn build_halts_on_conflict_and_writes_nothing() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["build", "-s", "adguardhome", "-s", "pihole"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("build halted"));

    assert!(!tmp.path().join("build").exists());
}

#[test]
fn build_refuses_project_directory_as_output() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("stackgen.toml"), "[stack]\nname = \"home\"\n").unwrap();
    std::fs::write(
        tmp.path().join("build-options.toml"),
        "selected_services = [\"mosquitto\"]\n",
    )
    .unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["build", "--out", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to replace"));

    assert!(tmp.path().join("stackgen.toml").exists());
    assert!(tmp.path().join("build-options.toml").exists());
}

#[test]
fn strict_build_fails_on_missing_template() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["build", "-s", "ghost", "-s", "mosquitto", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no template found for 'ghost'"));

    assert!(!tmp.path().join("build").exists());
}

#[test]
fn lenient_build_skips_failed_service() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["build", "-s", "ghost", "-s", "mosquitto"])
        .assert()
        .success()
        .stderr(predicate::str::contains("[failed] service 'ghost'"));

    let compose = std::fs::read_to_string(tmp.path().join("build/docker-compose.yml")).unwrap();
    assert!(compose.contains("mosquitto"));
    assert!(!compose.contains("ghost"));
}

#[test]
fn invalid_service_name_is_rejected() {
    let tmp = TempDir::new().unwrap();

    stackgen()
        .current_dir(tmp.path())
        .args(["build", "-s", "../etc"])
        .assert()
        .failure();
}
