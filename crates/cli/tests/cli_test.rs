//! # CLI Tests
//!
//! Runs the `coursesync` binary offline against a temporary database.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// A command that runs inside `dir` with its own database and an unreachable server.
fn coursesync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("coursesync").unwrap();
    cmd.current_dir(dir)
        .env("COURSESYNC_DB_PATH", dir.join("offline.db"))
        .env("COURSESYNC_MEDIA_DIR", dir.join("media"))
        .env("COURSESYNC_API_BASE_URL", "http://127.0.0.1:9")
        .env("COURSESYNC_REQUEST_TIMEOUT_SECS", "2");
    cmd
}

#[test]
fn test_status_on_a_fresh_database() {
    // Arrange
    let temp_dir = tempdir().unwrap();

    // Act & Assert
    coursesync(temp_dir.path())
        .args(["status", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Connectivity: offline"))
        .stdout(predicate::str::contains("Queued mutations: 0"))
        .stdout(predicate::str::contains("Downloaded courses: 0"));
}

#[test]
fn test_offline_writes_are_queued_across_runs() {
    // Arrange
    let temp_dir = tempdir().unwrap();

    // Act
    coursesync(temp_dir.path())
        .args(["progress", "--offline", "--user", "u1", "--course", "c1", "--lesson", "l1"])
        .args(["--percent", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued for sync"));
    coursesync(temp_dir.path())
        .args(["quiz", "--offline", "--user", "u1", "--quiz", "q1", "--answer", "q1=2"])
        .assert()
        .success();

    // Assert
    coursesync(temp_dir.path())
        .args(["status", "--offline", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued mutations: 2"))
        .stdout(predicate::str::contains("progress"))
        .stdout(predicate::str::contains("quiz"));
}

#[test]
fn test_offline_ask_prints_the_offline_answer() {
    let temp_dir = tempdir().unwrap();

    coursesync(temp_dir.path())
        .args(["ask", "--offline", "What is ownership?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("You are currently offline"));
}

#[test]
fn test_duplicate_forum_post_is_reported() {
    let temp_dir = tempdir().unwrap();
    let post = [
        "forum", "post", "--offline", "--user", "u1", "--title", "Lifetimes", "--content", "?",
    ];

    coursesync(temp_dir.path()).args(post).assert().success();

    coursesync(temp_dir.path())
        .args(post)
        .assert()
        .success()
        .stdout(predicate::str::contains("already waiting"));
}

#[test]
fn test_sync_while_offline_keeps_the_queue() {
    let temp_dir = tempdir().unwrap();
    coursesync(temp_dir.path())
        .args(["progress", "--offline", "--user", "u1", "--course", "c1"])
        .assert()
        .success();

    coursesync(temp_dir.path())
        .args(["sync", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 mutations remain queued"));
}

#[test]
fn test_download_fails_when_server_is_unreachable() {
    let temp_dir = tempdir().unwrap();

    coursesync(temp_dir.path())
        .args(["download", "c1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Command failed"));
}

#[test]
fn test_malformed_quiz_answer_is_rejected() {
    let temp_dir = tempdir().unwrap();

    coursesync(temp_dir.path())
        .args(["quiz", "--user", "u1", "--quiz", "q1", "--answer", "q1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("question_id=option_index"));
}
