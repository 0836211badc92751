use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, File};
use tempfile::TempDir;

#[test]
fn test_housekeep_clean_locks() {
    let dir = TempDir::new().unwrap();

    // Create orphaned lock
    let lock = dir.path().join("file.lock");
    File::create(&lock).unwrap();

    let mut cmd = Command::cargo_bin("lockman").unwrap();
    cmd.arg("housekeep")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted: "))
        .stdout(predicate::str::contains("file.lock"));

    assert!(!lock.exists());
}

#[test]
fn test_housekeep_dry_run() {
    let dir = TempDir::new().unwrap();
    let lock = dir.path().join("file.lock");
    File::create(&lock).unwrap();

    let mut cmd = Command::cargo_bin("lockman").unwrap();
    cmd.arg("housekeep")
        .arg("--dry-run")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN] Would delete: "))
        .stderr(predicate::str::contains("Cleaned 1 lock file(s)"));

    assert!(lock.exists(), "Dry run should not delete");
}

#[test]
fn test_housekeep_leaves_other_files() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data.txt");
    fs::write(&data, "payload").unwrap();

    let mut cmd = Command::cargo_bin("lockman").unwrap();
    cmd.arg("housekeep")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert!(data.exists());
}

#[test]
fn test_housekeep_invalid_duration() {
    let dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("lockman").unwrap();
    cmd.arg("housekeep")
        .arg("--older-than")
        .arg("soon")
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid duration format"));
}

#[test]
fn test_housekeep_missing_directory() {
    let dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("lockman").unwrap();
    cmd.arg("housekeep")
        .arg(dir.path().join("missing"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Path does not exist"));
}
