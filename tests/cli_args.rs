//! Binary-level argument surface tests. Nothing here reaches a cloud:
//! every invocation fails argument validation or only prints help.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn launch_node() -> Command {
    Command::cargo_bin("launch-node").expect("launch-node binary should exist")
}

#[test]
fn no_arguments_shows_usage() {
    launch_node()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn missing_cloud_flag_is_rejected() {
    launch_node()
        .args(["mirror01", "mirrors"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--cloud"));
}

#[test]
fn missing_group_positional_is_rejected() {
    launch_node()
        .args(["mirror01", "--cloud", "prod"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GROUP"));
}

#[test]
fn help_documents_the_full_flag_surface() {
    let assert = launch_node().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for flag in [
        "--cloud",
        "--region",
        "--flavor",
        "--image",
        "--network",
        "--volume",
        "--mount-path",
        "--fs-label",
        "--boot-from-volume",
        "--volume-size",
        "--az",
        "--config-drive",
        "--timeout",
        "--keep",
        "--verbose",
    ] {
        assert!(output.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn version_flag_succeeds() {
    launch_node()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("launch-node"));
}

#[test]
fn unknown_flag_is_rejected() {
    launch_node()
        .args(["mirror01", "mirrors", "--cloud", "prod", "--no-such-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--no-such-flag"));
}
