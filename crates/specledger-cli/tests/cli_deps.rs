//! CLI contract tests for commands that do not touch the network.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const MANIFEST: &str = "specledger/specledger.yaml";
const LOCKFILE: &str = "specledger/specledger.sum";

fn sl(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sl").unwrap();
    cmd.current_dir(dir)
        .env("SPECLEDGER_CACHE_DIR", dir.join(".cache"))
        .env("RUST_LOG", "warn");
    cmd
}

fn init_project(dir: &Path) {
    fs::create_dir_all(dir.join("specledger")).unwrap();
    fs::write(dir.join(MANIFEST), "version: 1.0.0\ndependencies: []\n").unwrap();
}

fn write_lockfile(dir: &Path) {
    let lock = r#"version: 1.0.0
entries:
  - repository_url: https://github.com/org/api
    commit_hash: 1111111111111111111111111111111111111111
    content_hash: 6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72
    spec_path: spec.md
    branch: main
    alias: api
    size: 12
    fetched_at: "2026-01-29T10:00:00Z"
total_size: 12
"#;
    fs::write(dir.join(LOCKFILE), lock).unwrap();
}

#[test]
fn test_outside_project_fails() {
    let dir = tempdir().unwrap();
    sl(dir.path())
        .args(["deps", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not inside a SpecLedger project"));
}

#[test]
fn test_add_list_remove() {
    let dir = tempdir().unwrap();
    init_project(dir.path());

    sl(dir.path())
        .args([
            "deps",
            "add",
            "https://github.com/org/api",
            "v1.0",
            "specs/api.md",
            "--alias",
            "api",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("as 'api'"));

    let manifest = fs::read_to_string(dir.path().join(MANIFEST)).unwrap();
    assert!(manifest.contains("repository_url: https://github.com/org/api"));
    assert!(manifest.contains("alias: api"));

    sl(dir.path())
        .args(["deps", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://github.com/org/api"))
        .stdout(predicate::str::contains("specs/api.md"));

    sl(dir.path())
        .args(["deps", "remove", "api"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed https://github.com/org/api"));

    sl(dir.path())
        .args(["deps", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No dependencies declared."));
}

#[test]
fn test_duplicate_and_invalid_dependencies_are_rejected() {
    let dir = tempdir().unwrap();
    init_project(dir.path());

    sl(dir.path())
        .args(["deps", "add", "https://github.com/org/api"])
        .assert()
        .success();
    let before = fs::read_to_string(dir.path().join(MANIFEST)).unwrap();

    sl(dir.path())
        .args(["deps", "add", "https://github.com/org/api"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));

    sl(dir.path())
        .args(["deps", "add", "ftp://example.com/repo"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid dependency"));

    assert_eq!(fs::read_to_string(dir.path().join(MANIFEST)).unwrap(), before);
}

#[test]
fn test_remove_unknown_dependency_fails() {
    let dir = tempdir().unwrap();
    init_project(dir.path());

    sl(dir.path())
        .args(["deps", "remove", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dependency not found: nope"));
}

#[test]
fn test_verify_reports_unlocked_dependencies() {
    let dir = tempdir().unwrap();
    init_project(dir.path());
    write_lockfile(dir.path());

    sl(dir.path())
        .args(["deps", "add", "https://github.com/org/api"])
        .assert()
        .success();
    sl(dir.path()).args(["deps", "verify"]).assert().success();

    sl(dir.path())
        .args(["deps", "add", "https://github.com/org/ui"])
        .assert()
        .success();
    sl(dir.path())
        .args(["deps", "verify"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("https://github.com/org/ui"));
}

#[test]
fn test_refs_validate_reports_positions() {
    let dir = tempdir().unwrap();
    init_project(dir.path());
    write_lockfile(dir.path());
    fs::create_dir_all(dir.path().join("specs/sub")).unwrap();
    fs::write(
        dir.path().join("specs/ok.md"),
        "Uses spec.api#auth and ![x](img.png)\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("specs/sub/bad.md"),
        "# Title\n  see spec[ghost#intro]\n",
    )
    .unwrap();

    sl(dir.path())
        .args(["refs", "validate"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("bad.md:2:7: unknown dependency: ghost (spec.ghost#intro)"))
        .stdout(predicate::str::contains("ok.md").not());

    sl(dir.path())
        .args(["refs", "validate", "specs/ok.md"])
        .assert()
        .success();
}

#[test]
fn test_cache_list_and_clear_on_empty_cache() {
    let dir = tempdir().unwrap();

    sl(dir.path())
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache is empty"));

    sl(dir.path()).args(["cache", "clear"]).assert().success();
}
