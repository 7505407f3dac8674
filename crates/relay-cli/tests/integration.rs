use assert_cmd::Command;
use predicates::prelude::*;

fn relay() -> Command {
    Command::cargo_bin("relay").unwrap()
}

// ---------------------------------------------------------------------------
// Argument validation (no server required)
// ---------------------------------------------------------------------------

#[test]
fn help_lists_the_subcommands() {
    relay()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("trigger"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn trigger_rejects_unknown_action_type() {
    relay()
        .args(["trigger", "delete-everything", "candidate", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown action type"))
        .stderr(predicate::str::contains("send-message"));
}

#[test]
fn trigger_rejects_malformed_payload_json() {
    relay()
        .args([
            "trigger",
            "send-message",
            "candidate",
            "42",
            "--payload",
            "{not json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --payload"));
}

#[test]
fn status_requires_a_correlation_id_or_a_full_key() {
    relay()
        .args(["status", "--entity-type", "candidate"])
        .assert()
        .failure();
}

#[test]
fn status_without_any_lookup_explains_the_options() {
    relay()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("correlation id"));
}

// ---------------------------------------------------------------------------
// Unreachable server
// ---------------------------------------------------------------------------

#[test]
fn watch_against_unreachable_server_fails_cleanly() {
    relay()
        .args(["--server", "http://127.0.0.1:1", "watch", "c-123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn stale_with_missing_db_creates_then_reports_empty() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("relay.db");
    relay()
        .args(["stale", "--db", db.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending actions"));
}
