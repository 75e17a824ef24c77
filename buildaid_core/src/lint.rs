use crate::env::BuildEnv;
use crate::launch::Invocation;
use crate::runfiles::Runfiles;
use faccess::PathExt;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LintError {
    #[error("'{0}' not found")]
    ExecutableNotFound(String),
    #[error("'{0}' not found")]
    ConfigNotFound(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LintConfig {
    #[serde(default = "default_executable_name")]
    pub executable_name: String,
    #[serde(default = "default_executable_rlocation")]
    pub executable_rlocation: String,
    #[serde(default = "default_config_rlocation")]
    pub config_rlocation: String,
    #[serde(default = "default_config_flag")]
    pub config_flag: String,
    /// Space-separated list of extracted wheel files to search when the
    /// runfiles lookup misses.
    #[serde(default = "default_fallback_env")]
    pub fallback_env: String,
}

fn default_executable_name() -> String {
    "ruff".to_string()
}
fn default_executable_rlocation() -> String {
    "rules_python++pip+pypi_313_ruff/bin/ruff".to_string()
}
fn default_config_rlocation() -> String {
    "_main/pyproject.toml".to_string()
}
fn default_config_flag() -> String {
    "--config".to_string()
}
fn default_fallback_env() -> String {
    "RUFF_EXTRACTED_WHL_FILES".to_string()
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            executable_name: default_executable_name(),
            executable_rlocation: default_executable_rlocation(),
            config_rlocation: default_config_rlocation(),
            config_flag: default_config_flag(),
            fallback_env: default_fallback_env(),
        }
    }
}

/// Checked against the effective ids, as `exec` will.
fn is_executable(path: &Path) -> bool {
    path.is_file() && path.executable()
}

fn canonical(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}

pub struct Linter<'a> {
    runfiles: Option<&'a Runfiles>,
    env: &'a BuildEnv,
    config: &'a LintConfig,
}

impl<'a> Linter<'a> {
    /// `runfiles` may be absent when the wrapper runs outside the build
    /// system; only the fallback list is consulted then.
    pub fn new(runfiles: Option<&'a Runfiles>, env: &'a BuildEnv, config: &'a LintConfig) -> Self {
        Self {
            runfiles,
            env,
            config,
        }
    }

    pub fn locate_executable(&self) -> Result<PathBuf, LintError> {
        if let Some(found) = self
            .runfiles
            .and_then(|rf| rf.rlocation(&self.config.executable_rlocation))
            .filter(|p| p.exists())
        {
            return Ok(canonical(found));
        }

        let wanted = format!("{}{}", self.config.executable_name, std::env::consts::EXE_SUFFIX);
        if let Some(files) = self.env.var(&self.config.fallback_env) {
            debug!(var = %self.config.fallback_env, "searching extracted wheel files");
            for candidate in files.split(' ').filter(|s| !s.is_empty()).map(Path::new) {
                let matches = candidate
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy() == wanted);
                if matches && is_executable(candidate) {
                    return Ok(canonical(candidate.to_path_buf()));
                }
            }
        }
        Err(LintError::ExecutableNotFound(self.config.executable_name.clone()))
    }

    pub fn locate_config(&self) -> Result<PathBuf, LintError> {
        self.runfiles
            .and_then(|rf| rf.rlocation(&self.config.config_rlocation))
            .filter(|p| p.exists())
            .map(canonical)
            .ok_or_else(|| {
                let name = Path::new(&self.config.config_rlocation)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.config.config_rlocation.clone());
                LintError::ConfigNotFound(name)
            })
    }

    /// `<linter> <config-flag> <config> <args...>`, run from the invocation directory.
    pub fn invocation(&self, args: Vec<OsString>) -> Result<Invocation, LintError> {
        let executable = self.locate_executable()?;
        let config = self.locate_config()?;
        info!(linter = %executable.display(), config = %config.display(), "running linter");
        Ok(Invocation::new(executable)
            .argv0(self.config.executable_name.as_str())
            .arg(self.config.config_flag.as_str())
            .arg(config)
            .args(args)
            .working_dir(Some(
                self.env
                    .working_directory()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")),
            )))
    }
}
