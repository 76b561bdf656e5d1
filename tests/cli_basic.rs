//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, each subcommand
//! responds to `--help`, and missing configuration fails cleanly.

#![allow(deprecated)] // cargo_bin deprecation — replacement not yet stable

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `facereply` binary.
fn facereply() -> Command {
    Command::cargo_bin("facereply").expect("binary 'facereply' should be built")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    facereply()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: facereply"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("follow"));
}

#[test]
fn short_help_flag_shows_usage() {
    facereply()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: facereply"));
}

#[test]
fn version_flag_shows_semver() {
    facereply()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^facereply \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_subcommand_fails_with_usage() {
    facereply()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// ─── Subcommand help ─────────────────────────────────────────────────────────

#[test]
fn run_help_describes_the_bot() {
    facereply()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("event stream"));
}

#[test]
fn follow_help_shows_delay_option() {
    facereply()
        .args(["follow", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--delay"));
}

// ─── Missing configuration ───────────────────────────────────────────────────

#[test]
fn run_without_env_reports_missing_variable() {
    facereply()
        .arg("run")
        .env_remove("FACEREPLY_STREAM_URL")
        .env_remove("FACEREPLY_API_BASE")
        .env_remove("FACEREPLY_TOKEN")
        .env_remove("RECOGNIZER_ENDPOINT_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FACEREPLY_STREAM_URL"));
}

#[test]
fn follow_without_env_reports_missing_variable() {
    facereply()
        .arg("follow")
        .env_remove("FACEREPLY_STREAM_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FACEREPLY_STREAM_URL"));
}

#[test]
fn unknown_subcommand_fails() {
    facereply()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
