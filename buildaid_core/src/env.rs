use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const TEST_TMPDIR: &str = "TEST_TMPDIR";
pub const TMPDIR: &str = "TMPDIR";
pub const BUILD_WORKING_DIRECTORY: &str = "BUILD_WORKING_DIRECTORY";
pub const GITHUB_RUN_NUMBER: &str = "GITHUB_RUN_NUMBER";
pub const RUNFILES_MANIFEST_FILE: &str = "RUNFILES_MANIFEST_FILE";
pub const RUNFILES_DIR: &str = "RUNFILES_DIR";
pub const TEST_SRCDIR: &str = "TEST_SRCDIR";

/// Snapshot of the environment variables the helpers read.
///
/// Everything downstream takes a `&BuildEnv` instead of calling
/// `std::env::var` so that tests can describe an environment without
/// mutating the process one.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    pub test_tmpdir: Option<PathBuf>,
    pub tmpdir: Option<PathBuf>,
    /// Only set under `bazel run`; `bazel test` leaves it out.
    pub build_working_directory: Option<PathBuf>,
    pub github_run_number: Option<String>,
    pub runfiles_manifest_file: Option<PathBuf>,
    pub runfiles_dir: Option<PathBuf>,
    pub test_srcdir: Option<PathBuf>,
    /// Values of extra variables requested by name (e.g. the linter wheel fallback).
    pub extra: Vec<(String, String)>,
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|v| !v.is_empty())
}

fn path_var(name: &str) -> Option<PathBuf> {
    non_empty(std::env::var_os(name)).map(PathBuf::from)
}

impl BuildEnv {
    pub fn from_process() -> Self {
        Self {
            test_tmpdir: path_var(TEST_TMPDIR),
            tmpdir: path_var(TMPDIR),
            build_working_directory: path_var(BUILD_WORKING_DIRECTORY),
            github_run_number: std::env::var(GITHUB_RUN_NUMBER)
                .ok()
                .filter(|v| !v.is_empty()),
            runfiles_manifest_file: path_var(RUNFILES_MANIFEST_FILE),
            runfiles_dir: path_var(RUNFILES_DIR),
            test_srcdir: path_var(TEST_SRCDIR),
            extra: Vec::new(),
        }
    }

    /// Captures an additional variable so it can be looked up with [`BuildEnv::var`].
    pub fn capture(mut self, name: &str) -> Self {
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                self.extra.push((name.to_string(), value));
            }
        }
        self
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.extra.retain(|(k, _)| k != name);
        self.extra.push((name.to_string(), value.into()));
        self
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Scratch directory: `TEST_TMPDIR`, then `TMPDIR`, then the platform default.
    pub fn tmpdir(&self) -> PathBuf {
        self.test_tmpdir
            .clone()
            .or_else(|| self.tmpdir.clone())
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.build_working_directory.as_deref()
    }

    /// Interprets `path` as the user typed it, i.e. relative to the directory
    /// `bazel run` was invoked from.
    pub fn resolve_from_invocation_dir(&self, path: &Path) -> PathBuf {
        match self.working_directory() {
            Some(bwd) if path.is_relative() => bwd.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn run_number(&self) -> String {
        format!("r{}", self.github_run_number.as_deref().unwrap_or("0"))
    }
}
