//! Manager and score subcommands through the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn thunt(root: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("thunt").expect("binary");
    cmd.current_dir(root.path())
        .env_remove("RUST_LOG")
        .arg("--root")
        .arg(root.path());
    cmd
}

fn add(root: &TempDir, hunt: &str, id: &str, value: &str) {
    thunt(root)
        .args(["manager", "add", hunt, "--id", id, "--owner", "ana"])
        .args(["--latitude", "-12.5", "--longitude", "130.8", "--note", "near the river"])
        .args(["--value", value])
        .assert()
        .success()
        .stdout("Treasure added successfully.\n");
}

#[test]
fn score_sums_every_record() {
    let root = TempDir::new().expect("temp dir");
    add(&root, "h1", "1", "10");
    add(&root, "h1", "2", "-3");
    add(&root, "h1", "3", "7");

    thunt(&root)
        .args(["score", "h1"])
        .assert()
        .success()
        .stdout("Total score for hunt 'h1': 14\n");
}

#[test]
fn score_of_missing_hunt_exits_with_one() {
    let root = TempDir::new().expect("temp dir");
    thunt(&root)
        .args(["score", "ghost"])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("hunt 'ghost' not found"));
}

#[test]
fn list_view_and_remove_treasure() {
    let root = TempDir::new().expect("temp dir");
    add(&root, "h1", "5", "50");
    add(&root, "h1", "6", "60");

    thunt(&root)
        .args(["manager", "list", "h1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total file size: 642 bytes"))
        .stdout(predicate::str::contains("Treasure #2:\n  ID        : 6"));

    thunt(&root)
        .args(["manager", "view", "h1", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("  Latitude  : -12.500000"))
        .stdout(predicate::str::contains("  Clue      : near the river"));

    thunt(&root)
        .args(["manager", "remove-treasure", "h1", "5"])
        .assert()
        .success();

    thunt(&root)
        .args(["manager", "view", "h1", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("treasure with ID 5 not found in hunt 'h1'"));

    let log = std::fs::read_to_string(root.path().join("logged_hunt-h1")).expect("alias");
    assert_eq!(log.lines().count(), 3);
    assert!(log.contains("Removed treasure ID 5"));
}

#[test]
fn remove_hunt_cleans_up_alias() {
    let root = TempDir::new().expect("temp dir");
    add(&root, "h1", "1", "1");
    assert!(root.path().join("logged_hunt-h1").exists());

    thunt(&root)
        .args(["manager", "remove-hunt", "h1"])
        .assert()
        .success();
    assert!(!root.path().join("h1").exists());
    assert!(std::fs::symlink_metadata(root.path().join("logged_hunt-h1")).is_err());
}

#[test]
fn oversized_owner_is_rejected() {
    let root = TempDir::new().expect("temp dir");
    let owner = "x".repeat(51);
    thunt(&root)
        .args(["manager", "add", "h1", "--id", "1", "--owner", &owner])
        .args(["--latitude", "0", "--longitude", "0", "--value", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("owner is 51 bytes"));
    assert!(!root.path().join("h1").exists());
}

#[test]
fn invalid_hunt_id_is_a_usage_error() {
    let root = TempDir::new().expect("temp dir");
    thunt(&root)
        .args(["manager", "list", "../escape"])
        .assert()
        .code(2);
}
