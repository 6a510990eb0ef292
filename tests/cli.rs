//! Binary-level tests for release-lane

use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::prelude::*;
use release_lane::Archiver;
use tempfile::TempDir;

const CLEARED_VARS: &[&str] = &[
    "TRAVIS_BRANCH",
    "APPVEYOR_REPO_BRANCH",
    "is_debug_build",
    "ftp_username",
    "ftp_password",
    "ftp_hostname",
    "ftp_directory",
];

fn release_lane(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("release-lane").unwrap();
    cmd.current_dir(dir);
    for var in CLEARED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn git_available() -> bool {
    StdCommand::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = StdCommand::new("git")
        .args(["-c", "user.name=Release Bot", "-c", "user.email=bot@example.org"])
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

#[test]
fn test_manifest_table() {
    let dir = TempDir::new().unwrap();
    let staging = dir.path().join("package");
    fs::create_dir_all(staging.join("addons")).unwrap();
    fs::write(staging.join("addons/accelerator.ext.so"), b"binary").unwrap();
    let archive = dir.path().join("out.zip");
    Archiver::new(&staging).create(&archive).unwrap();

    release_lane(dir.path())
        .arg("manifest")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("File Name"))
        .stdout(predicate::str::contains("addons/accelerator.ext.so"));
}

#[test]
fn test_manifest_json() {
    let dir = TempDir::new().unwrap();
    let staging = dir.path().join("package");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("readme.txt"), "hi").unwrap();
    let archive = dir.path().join("out.zip");
    Archiver::new(&staging).create(&archive).unwrap();

    let output = release_lane(dir.path())
        .args(["manifest", "--json"])
        .arg(&archive)
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["entries"][0]["path"], "readme.txt");
    assert_eq!(value["entries"][0]["size"], 2);
}

#[test]
fn test_manifest_of_missing_archive_fails() {
    let dir = TempDir::new().unwrap();
    release_lane(dir.path())
        .args(["manifest", "nope.zip"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: report error"));
}

#[test]
fn test_missing_version_file_fails_before_archiving() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("package")).unwrap();

    release_lane(dir.path())
        .args(["package", "--no-upload", "--version-file", "missing.version"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing.version"));

    let zips = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "zip"))
        .count();
    assert_eq!(zips, 0);
}

#[test]
fn test_unknown_config_key_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("release.toml"), "projekt = \"typo\"\n").unwrap();

    release_lane(dir.path())
        .args(["version"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn test_incomplete_ftp_variables_rejected() {
    let dir = TempDir::new().unwrap();

    release_lane(dir.path())
        .args(["package"])
        .env("ftp_hostname", "ftp.example.org")
        .env("ftp_username", "builder")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ftp_password"));
}

#[test]
fn test_version_outside_repository_forwards_git_status() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("product.version"), "1.2.3\n").unwrap();

    release_lane(dir.path())
        .args(["version", "--version-file", "product.version"])
        .env("GIT_CEILING_DIRECTORIES", dir.path().parent().unwrap())
        .assert()
        .code(128)
        .stderr(predicate::str::contains("git"));
}

#[test]
fn test_package_in_real_repository() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let repo = dir.path();
    git(repo, &["init", "--quiet"]);
    git(repo, &["commit", "--quiet", "--allow-empty", "-m", "first"]);
    git(repo, &["commit", "--quiet", "--allow-empty", "-m", "second"]);

    fs::write(repo.join("product.version"), "2.4.0-dev\n").unwrap();
    fs::create_dir_all(repo.join("package/addons")).unwrap();
    fs::write(repo.join("package/addons/accelerator.ext.so"), b"binary").unwrap();

    let name_pattern = r"^accelerator-2\.4\.0-git2-[0-9a-f]{4,}-(linux|windows|mac|unknown)\.zip\n$";
    release_lane(repo)
        .args(["version", "--version-file", "product.version"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(name_pattern).unwrap());

    let output = release_lane(repo)
        .args([
            "package",
            "--no-upload",
            "--json",
            "--version-file",
            "product.version",
            "--output-dir",
            "dist",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let archive_name = summary["archive_name"].as_str().unwrap();
    assert!(repo.join("dist").join(archive_name).is_file());
    assert_eq!(summary["upload"]["transport"], "skipped");
    assert_eq!(summary["archive"]["file_count"], 1);
}
