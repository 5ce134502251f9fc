//! CLI surface smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn rigsup() -> Command {
    Command::cargo_bin("rigsup").unwrap()
}

#[test]
fn help_lists_subcommands() {
    rigsup()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("fetch")
                .and(predicate::str::contains("mine"))
                .and(predicate::str::contains("node")),
        );
}

#[test]
fn version_flag_works() {
    rigsup()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rigsup"));
}

#[test]
fn completions_emit_shell_script() {
    rigsup()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rigsup"));
}

#[test]
fn fetch_node_without_network_fails_cleanly() {
    rigsup()
        .args(["fetch", "node"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--network"));
}

#[test]
fn mine_without_wallet_fails_cleanly() {
    rigsup()
        .args(["mine"])
        .env_remove("RIGSUP_WALLET")
        .assert()
        .failure()
        .stderr(predicate::str::contains("wallet"));
}
