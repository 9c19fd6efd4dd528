use std::net::TcpListener;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn dts_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dts-util"));
    cmd.env("HOME", home)
        .env_remove("DRAW_THINGS_MODEL_PATH")
        .env_remove("RUST_LOG");
    cmd
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

#[test]
fn no_arguments_prints_usage_and_succeeds() {
    let home = TempDir::new().expect("home");
    dts_cmd(home.path())
        .assert()
        .success()
        .stdout(contains("Usage"))
        .stdout(contains("install"));
}

#[test]
fn help_lists_every_subcommand() {
    let home = TempDir::new().expect("home");
    dts_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("install"))
        .stdout(contains("uninstall"))
        .stdout(contains("restart"))
        .stdout(contains("test"));
}

#[test]
fn install_help_documents_server_options() {
    let home = TempDir::new().expect("home");
    dts_cmd(home.path())
        .args(["install", "--help"])
        .assert()
        .success()
        .stdout(contains("--model-path"))
        .stdout(contains("--shared-secret"))
        .stdout(contains("--no-flash-attention"))
        .stdout(contains("--join"));
}

#[test]
fn unknown_flag_exits_with_one() {
    let home = TempDir::new().expect("home");
    dts_cmd(home.path())
        .args(["install", "--bogus"])
        .assert()
        .code(1);
}

#[test]
fn restart_without_install_reports_not_installed() {
    let home = TempDir::new().expect("home");
    dts_cmd(home.path())
        .arg("restart")
        .assert()
        .code(1)
        .stderr(contains("not installed"));

    assert!(!home.path().join("Library/LaunchAgents").exists());
}

#[test]
fn test_against_closed_port_fails() {
    let home = TempDir::new().expect("home");
    let port = closed_port();
    dts_cmd(home.path())
        .args(["test", "--port", &port.to_string()])
        .assert()
        .code(1)
        .stderr(contains("could not connect"));
}

#[test]
fn invalid_join_is_rejected_before_install_starts() {
    let home = TempDir::new().expect("home");
    let models = home.path().join("Models");
    std::fs::create_dir_all(&models).expect("models");

    dts_cmd(home.path())
        .args(["install", "-q", "--join", "{\"host\": \"proxy.local\"}"])
        .arg("--model-path")
        .arg(&models)
        .assert()
        .code(1)
        .stderr(contains("--join"))
        .stderr(contains("port"));

    assert!(!home.path().join("Library/LaunchAgents").exists());
}

#[test]
fn quiet_install_without_models_fails_cleanly() {
    let home = TempDir::new().expect("home");
    dts_cmd(home.path())
        .args(["install", "-q"])
        .assert()
        .code(1)
        .stderr(contains("DRAW_THINGS_MODEL_PATH"));

    assert!(!home.path().join("Library/LaunchAgents").exists());
}
