//! CLI surface contract: flags, exit codes, and human output.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use assert_cmd::Command;
use predicates::prelude::*;

fn spt() -> Command {
    Command::cargo_bin("spt").expect("binary builds")
}

#[test]
fn help_names_the_tool_and_subcommands() {
    spt()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Site Property Toolkit")
                .and(predicate::str::contains("run"))
                .and(predicate::str::contains("status"))
                .and(predicate::str::contains("stages"))
                .and(predicate::str::contains("init-db")),
        );
}

#[test]
fn stages_lists_the_full_catalog() {
    spt()
        .arg("stages")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Property Discovery")
                .and(predicate::str::contains("Zoning Analysis"))
                .and(predicate::str::contains("Feasibility Score"))
                .and(predicate::str::contains("Report Assembly")),
        );
}

#[test]
fn errors_lists_protocol_codes_with_hints() {
    spt()
        .arg("errors")
        .assert()
        .success()
        .stdout(predicate::str::contains("BUSY").and(predicate::str::contains("💡")));
}

#[test]
fn malformed_project_ids_exit_with_the_invalid_id_code() {
    spt()
        .args(["run", "123-main-st", "--memory"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Invalid project id"));
}

#[test]
fn memory_run_with_unreachable_collaborators_exits_blocked() {
    spt()
        .args(["run", "SPT-2025-001", "--memory"])
        .env("SPT_MAX_ATTEMPTS", "1")
        .env("SPT_PROPERTY_REGISTRY_CMD", "exit 1")
        .env("SPT_ZONING_SOURCE_CMD", "exit 1")
        .env("SPT_RENDERER_CMD", "exit 1")
        .env("SPT_REASONING_CMD", "exit 1")
        .assert()
        .code(20)
        .stdout(predicate::str::contains("blocked"));
}
