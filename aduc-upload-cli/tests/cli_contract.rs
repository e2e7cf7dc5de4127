//! Integration tests for the CLI's argument-parsing and exit-code contract.
//!
//! These never touch real hardware: they exercise the cases that fail before
//! (or without) opening a serial port, so the assertions hold in CI.

use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("aduc-upload").expect("binary should build")
}

#[test]
fn help_exits_zero_and_mentions_the_binary_name() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("aduc-upload"));
}

#[test]
fn version_exits_zero() {
    cli_cmd().arg("--version").assert().success();
}

#[test]
fn missing_required_port_fails_with_nonzero_exit() {
    cli_cmd()
        .arg("firmware.hex")
        .assert()
        .failure()
        .stderr(predicate::str::contains("port"));
}

#[test]
fn nonexistent_input_file_fails_before_touching_the_port() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("does-not-exist.hex");

    cli_cmd()
        .args(["--port", "/dev/does-not-exist", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn unopenable_port_fails_with_nonzero_exit() {
    let dir = tempdir().expect("tempdir should be created");
    let firmware = dir.path().join("raw.bin");
    fs::write(&firmware, [0xDE, 0xAD, 0xBE, 0xEF]).expect("write raw.bin");

    cli_cmd()
        .args([
            "--port",
            "/dev/nonexistent-aduc-upload-test-port",
            firmware.to_str().unwrap(),
        ])
        .assert()
        .failure();
}

#[test]
fn invalid_address_is_rejected_by_argument_parsing() {
    let dir = tempdir().expect("tempdir should be created");
    let firmware = dir.path().join("raw.bin");
    fs::write(&firmware, [0x00]).expect("write raw.bin");

    cli_cmd()
        .args([
            "--port",
            "/dev/does-not-exist",
            "--address",
            "not-hex",
            firmware.to_str().unwrap(),
        ])
        .assert()
        .failure();
}
