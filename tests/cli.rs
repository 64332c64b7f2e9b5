// ABOUTME: Integration tests for the rollout CLI commands.
// ABOUTME: Validates --help output, exit codes and a full rollout against a real git repository.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn rollout_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rollout"));
    cmd.current_dir(dir)
        .envs(support::GIT_IDENTITY)
        .env("USER", "alice")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_shows_actions() {
    let dir = tempfile::tempdir().unwrap();
    rollout_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("hotfix"))
        .stdout(predicate::str::contains("manual-sync"))
        .stdout(predicate::str::contains("revert"))
        .stdout(predicate::str::contains("show-tag"));
}

#[test]
fn missing_environment_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    rollout_cmd(dir.path())
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no environment given"));
}

#[test]
fn invalid_environment_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    rollout_cmd(dir.path())
        .args(["status", "-sheep"])
        .assert()
        .failure();
}

#[test]
fn quiet_and_json_conflict() {
    let dir = tempfile::tempdir().unwrap();
    rollout_cmd(dir.path())
        .args(["--quiet", "--json", "status", "sheep"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn bad_cutoff_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    rollout_cmd(dir.path())
        .args(["log", "sheep", "--ignore-older-than", "last-tuesday"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("YYYYMMDD"));
}

#[test]
fn time_zone_date_format_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    rollout_cmd(dir.path())
        .args(["--date-fmt", "%Y%m%d-%H%M%z", "status", "sheep"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid tag date format"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("rollout.yml"), "enviroment: sheep\n").unwrap();
    rollout_cmd(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rollout.yml"));
}

#[test]
fn block_file_stops_start() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("rollout.yml"),
        "environment: sheep\nblock_file: NO_DEPLOY\n",
    )
    .unwrap();
    fs::write(dir.path().join("NO_DEPLOY"), "database migration running\n").unwrap();

    rollout_cmd(dir.path())
        .args(["--no-check-clean", "--no-remote", "start"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("database migration running"));
}

#[test]
fn full_rollout_against_git() {
    let Some(repo) = support::git_repo() else {
        return;
    };
    let root = repo.path();
    support::write_sync(root, "sheep", "#!/bin/sh\necho synced > \"$ROLLOUT_ROOT/synced\"\n");
    let head = support::git(root, &["rev-parse", "HEAD"]).trim().to_string();

    rollout_cmd(root)
        .args(["--no-remote", "start", "sheep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Locked sheep"));

    rollout_cmd(root)
        .args(["--json", "status", "sheep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\":\"started\""));

    // A second start is refused while the lock is held.
    rollout_cmd(root)
        .args(["--no-remote", "start", "sheep"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("alice@"));

    rollout_cmd(root)
        .args(["--no-remote", "sync", "sheep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled out sheep-"));

    assert!(root.join("synced").exists());
    let tags = support::git(root, &["tag", "--list", "sheep-*"]);
    assert_eq!(tags.lines().count(), 1, "tags: {tags}");

    let record = fs::read_to_string(root.join(".deploy")).unwrap();
    assert!(record.starts_with(&format!("commit: {head}\n")), "record:\n{record}");

    rollout_cmd(root)
        .args(["--no-remote", "log", "sheep"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("* sheep-"));

    rollout_cmd(root)
        .args(["--no-remote", "show", "sheep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deployed-by: alice"));

    rollout_cmd(root)
        .args(["status", "sheep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sheep: unlocked"));
}

#[test]
fn abort_restores_start_commit() {
    let Some(repo) = support::git_repo() else {
        return;
    };
    let root = repo.path();
    let first = support::git(root, &["rev-parse", "HEAD"]).trim().to_string();

    rollout_cmd(root)
        .args(["--no-remote", "hotfix", "sheep"])
        .assert()
        .success();

    fs::write(root.join("README"), "goat\n").unwrap();
    support::git(root, &["commit", "--quiet", "-am", "hotfix"]);
    assert_ne!(support::git(root, &["rev-parse", "HEAD"]).trim(), first);

    rollout_cmd(root)
        .args(["--no-remote", "abort", "sheep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lock released"));

    assert_eq!(support::git(root, &["rev-parse", "HEAD"]).trim(), first);
    rollout_cmd(root)
        .args(["abort", "sheep"])
        .assert()
        .code(5);
}
