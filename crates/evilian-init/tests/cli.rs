//! Integration tests for the evilian-init CLI
//!
//! Only paths that never reach Azure are exercised: help, argument errors,
//! input validation, `--show-config` and `--dry-run`.

#![allow(clippy::expect_used, deprecated)]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

/// Binary with a private config dir and no `EVILIAN_*` overrides
fn evilian(config_home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("evilian-init").expect("evilian-init binary should exist");
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("EVILIAN_REGION")
        .env_remove("EVILIAN_VM_SIZE")
        .env_remove("EVILIAN_IMAGE")
        .env_remove("EVILIAN_LOG");
    cmd
}

fn config_home() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

#[test]
fn test_help_exits_zero() {
    let home = config_home();
    evilian(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--no-connect"));
}

#[test]
fn test_missing_arguments_fail() {
    let home = config_home();
    evilian(&home).assert().failure();
    evilian(&home).arg("203.0.113.5/32").assert().failure();
}

#[test]
fn test_invalid_range_is_rejected() {
    let home = config_home();
    evilian(&home)
        .args(["300.1.1.1/32", "lab", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid network range"));
}

#[test]
fn test_invalid_prefix_is_rejected() {
    let home = config_home();
    evilian(&home)
        .args(["10.0.0.0/33", "lab", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid network range"));
}

#[test]
fn test_invalid_name_is_rejected() {
    let home = config_home();
    evilian(&home)
        .args(["203.0.113.5/32", "bad_name", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid project name"));
}

#[test]
fn test_invalid_input_fails_without_dry_run() {
    // Validation runs before any az call
    let home = config_home();
    evilian(&home)
        .args(["not-a-range", "lab", "--yes", "--no-connect"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid network range"));
}

#[test]
fn test_dry_run_prints_derived_names() {
    let home = config_home();
    evilian(&home)
        .args(["203.0.113.5/32", "Evil123", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("evilian-evil123-rg"))
        .stdout(predicate::str::contains("evilian-evil123-vm"))
        .stdout(predicate::str::contains("evilian-evil123-nsg"))
        .stdout(predicate::str::contains("AllowAdminFromOperator"))
        .stdout(predicate::str::contains("DenyAllInbound"))
        .stdout(predicate::str::contains("westeurope"))
        .stdout(predicate::str::contains("set -euo pipefail"))
        .stdout(predicate::str::contains("kali-linux-headless"));
}

#[test]
fn test_config_file_supplies_defaults() {
    let home = config_home();
    let dir = home.path().join("evilian");
    fs::create_dir_all(&dir).expect("config dir");
    fs::write(
        dir.join("init.toml"),
        "[vm]\nregion = \"northeurope\"\nsize = \"Standard_D2s_v5\"\n\n[bootstrap]\ntoolset = [\"nmap\"]\n",
    )
    .expect("write config");

    evilian(&home)
        .args(["203.0.113.5", "lab", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("northeurope"))
        .stdout(predicate::str::contains("Standard_D2s_v5"))
        .stdout(predicate::str::contains("kali-linux-headless").not());
}

#[test]
fn test_custom_toolset_is_verified_by_its_packages() {
    let home = config_home();
    let config = home.path().join("sqlmap.toml");
    fs::write(&config, "[bootstrap]\ntoolset = [\"sqlmap\"]\n").expect("write config");

    evilian(&home)
        .args(["203.0.113.5", "lab", "--dry-run", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("command -v sqlmap"))
        .stdout(predicate::str::contains("command -v msfconsole").not());
}

#[test]
fn test_cli_overrides_env_and_file() {
    let home = config_home();
    let config = home.path().join("custom.toml");
    fs::write(&config, "[vm]\nregion = \"northeurope\"\n").expect("write config");

    evilian(&home)
        .env("EVILIAN_REGION", "uksouth")
        .args(["203.0.113.5", "lab", "--dry-run", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("uksouth"));

    evilian(&home)
        .env("EVILIAN_REGION", "uksouth")
        .args(["203.0.113.5", "lab", "--dry-run", "--region", "eastus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eastus"))
        .stdout(predicate::str::contains("uksouth").not());
}

#[test]
fn test_broken_config_file_fails() {
    let home = config_home();
    let config = home.path().join("broken.toml");
    fs::write(&config, "[vm\nregion = ").expect("write config");

    evilian(&home)
        .args(["203.0.113.5", "lab", "--dry-run", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_show_config_needs_no_positionals() {
    let home = config_home();
    evilian(&home)
        .arg("--show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("init.toml"))
        .stdout(predicate::str::contains("not found"));
}
