//! End-to-end runs of the `buildaid` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCRUBBED_ENV: &[&str] = &[
    "TEST_TMPDIR",
    "BUILD_WORKING_DIRECTORY",
    "GITHUB_RUN_NUMBER",
    "RUNFILES_MANIFEST_FILE",
    "RUNFILES_DIR",
    "TEST_SRCDIR",
    "RUFF_EXTRACTED_WHL_FILES",
    "BUILDAID_LOG",
];

/// `buildaid` run from `cwd` with the build-system variables cleared.
fn buildaid(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("buildaid").unwrap();
    for var in SCRUBBED_ENV {
        cmd.env_remove(var);
    }
    cmd.current_dir(cwd).timeout(Duration::from_secs(30));
    cmd
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

#[test]
fn comb_writes_table() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("gen/comb.json");
    buildaid(dir.path())
        .args(["comb", "--size", "4", "--path"])
        .arg(&out)
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"table": [[1,0,0,0],[1,1,0,0],[1,2,1,0],[1,3,3,1]]})
    );
}

#[test]
fn comb_size_comes_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("custom.toml"), "[comb]\nsize = 2\n").unwrap();
    buildaid(dir.path())
        .args(["--config-file", "custom.toml", "comb", "--path", "t.json"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(dir.path().join("t.json")).unwrap(),
        r#"{"table":[[1,0],[1,1]]}"#
    );
}

#[test]
fn comb_overflow_fails() {
    let dir = tempfile::tempdir().unwrap();
    buildaid(dir.path())
        .args(["comb", "--size", "100", "--path", "t.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not fit in 64 bits"));
}

#[test]
fn comb_huge_size_fails_before_allocating() {
    let dir = tempfile::tempdir().unwrap();
    buildaid(dir.path())
        .args(["comb", "--size", "2147483648", "--path", "t.json"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not fit in 64 bits"));
    assert!(!dir.path().join("t.json").exists());
}

#[test]
fn bad_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("buildaid.toml"), "[comb]\nsize = \"big\"\n").unwrap();
    buildaid(dir.path())
        .args(["comb", "--path", "t.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse TOML"));
}

#[cfg(unix)]
#[test]
fn fuzz_execs_target_with_artifact_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let tmp = dir.path().join("tmp");
    let target = write_script(
        &dir.path().join("bin/echo_fuzz_target"),
        r#"printf '%s\n' "$@""#,
    );

    let artifact = tmp.join("fuzzing/echo/artifact");
    buildaid(dir.path())
        .env("TEST_TMPDIR", &tmp)
        .arg("fuzz")
        .arg(&target)
        .args(["-runs=3", "corpus"])
        .assert()
        .success()
        .stdout(predicate::str::diff(format!(
            "-artifact_prefix={}/\n-runs=3\ncorpus\n",
            artifact.display()
        )));
    assert!(artifact.is_dir());
}

#[cfg(unix)]
#[test]
fn fuzz_output_root_is_relative_to_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let bwd = dir.path().join("checkout");
    fs::create_dir_all(&bwd).unwrap();
    let target = write_script(&dir.path().join("bin/parse_fuzz_target"), "pwd -P");

    buildaid(dir.path())
        .env("BUILD_WORKING_DIRECTORY", &bwd)
        .args(["fuzz", "--output_root", "out", "--flat"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::diff(format!(
            "{}\n",
            bwd.canonicalize().unwrap().display()
        )));
    assert!(bwd.join("out/artifact").is_dir());
}

#[test]
fn fuzz_missing_target_fails() {
    let dir = tempfile::tempdir().unwrap();
    buildaid(dir.path())
        .env("TEST_TMPDIR", dir.path())
        .args(["fuzz", "missing_fuzz_target"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn lint_without_linter_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let runfiles = dir.path().join("runfiles");
    fs::create_dir_all(runfiles.join("_main")).unwrap();
    fs::write(runfiles.join("_main/pyproject.toml"), "").unwrap();

    buildaid(dir.path())
        .env("RUNFILES_DIR", &runfiles)
        .args(["lint", "check"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("'ruff' not found"));
}

#[cfg(unix)]
#[test]
fn lint_runs_linter_with_config_from_runfiles() {
    let dir = tempfile::tempdir().unwrap();
    let runfiles = dir.path().join("runfiles");
    write_script(
        &runfiles.join("rules_python++pip+pypi_313_ruff/bin/ruff"),
        r#"printf '%s\n' "$@"; pwd -P"#,
    );
    let pyproject = runfiles.join("_main/pyproject.toml");
    fs::create_dir_all(pyproject.parent().unwrap()).unwrap();
    fs::write(&pyproject, "").unwrap();
    let bwd = dir.path().join("src");
    fs::create_dir_all(&bwd).unwrap();

    buildaid(dir.path())
        .env("RUNFILES_DIR", &runfiles)
        .env("BUILD_WORKING_DIRECTORY", &bwd)
        .args(["lint", "check", "--fix", "."])
        .assert()
        .success()
        .stdout(predicate::str::diff(format!(
            "--config\n{}\ncheck\n--fix\n.\n{}\n",
            pyproject.canonicalize().unwrap().display(),
            bwd.canonicalize().unwrap().display()
        )));
}

#[cfg(unix)]
#[test]
fn lint_resolves_config_through_repo_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let runfiles = dir.path().join("runfiles");
    write_script(
        &runfiles.join("rules_python++pip+pypi_313_ruff/bin/ruff"),
        r#"printf '%s\n' "$2""#,
    );
    fs::create_dir_all(runfiles.join("my_ws+")).unwrap();
    let pyproject = runfiles.join("my_ws+/pyproject.toml");
    fs::write(&pyproject, "").unwrap();
    fs::write(runfiles.join("_repo_mapping"), ",_main,my_ws+\n").unwrap();

    buildaid(dir.path())
        .env("RUNFILES_DIR", &runfiles)
        .args(["lint", "check"])
        .assert()
        .success()
        .stdout(predicate::str::diff(format!(
            "{}\n",
            pyproject.canonicalize().unwrap().display()
        )));
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn stamp_without_git_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    buildaid(dir.path())
        .env("PATH", "")
        .arg("stamp")
        .assert()
        .failure()
        .stderr(predicate::str::contains("git executable not found"));
}

#[test]
fn stamp_prints_status_and_revision() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = tempfile::tempdir().unwrap();
    let git = |args: &[&str]| {
        let status = std::process::Command::new("git")
            .args([
                "-c",
                "user.name=buildaid",
                "-c",
                "user.email=buildaid@localhost",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(repo.path())
            .status()
            .unwrap();
        assert!(status.success());
    };
    git(&["init", "-q"]);
    fs::write(repo.path().join("file"), "x").unwrap();
    git(&["add", "file"]);
    git(&["commit", "-q", "-m", "one"]);

    let elsewhere = tempfile::tempdir().unwrap();
    buildaid(elsewhere.path())
        .env("BUILD_WORKING_DIRECTORY", repo.path())
        .env("GITHUB_RUN_NUMBER", "9")
        .args(["stamp", "--run-number"])
        .assert()
        .success()
        .stdout(
            predicate::str::is_match(
                r"^STABLE_GIT_STATUS clean\nSTABLE_GIT_REVISION [0-9a-f]{10}\nSTABLE_BUILD_RUN r9\n$",
            )
            .unwrap(),
        );

    let out = repo.path().join("stamp.txt");
    buildaid(elsewhere.path())
        .env("BUILD_WORKING_DIRECTORY", repo.path())
        .args(["stamp", "--output", "stamp.txt"])
        .assert()
        .success()
        .stdout("");
    let written = fs::read_to_string(out).unwrap();
    // The stamp file itself is untracked, but it is created after git ran.
    assert!(written.starts_with("STABLE_GIT_STATUS clean\n"));
    assert_eq!(written.lines().count(), 2);
}
