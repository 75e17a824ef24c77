//! Workspace status for build stamping.
//!
//! The build system runs this as its workspace status command and reads
//! `KEY value` lines from the output. Keys prefixed with `STABLE_` cause
//! dependent actions to rebuild when the value changes.

use crate::env::BuildEnv;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Number of hex digits of HEAD that go into the stamp.
pub const REVISION_WIDTH: usize = 10;

pub const GIT_STATUS_KEY: &str = "STABLE_GIT_STATUS";
pub const GIT_REVISION_KEY: &str = "STABLE_GIT_REVISION";
pub const BUILD_RUN_KEY: &str = "STABLE_BUILD_RUN";

#[derive(Error, Debug)]
pub enum StampError {
    #[error("git executable not found")]
    GitNotFound,
    #[error("git {} failed: {stderr}", args.join(" "))]
    Git { args: Vec<String>, stderr: String },
    #[error("unexpected revision from git: {0:?}")]
    MalformedRevision(String),
    #[error("I/O error while stamping: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeStatus {
    Clean,
    Dirty,
}

impl TreeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeStatus::Clean => "clean",
            TreeStatus::Dirty => "dirty",
        }
    }
}

pub trait Vcs {
    fn status(&self) -> Result<TreeStatus, StampError>;
    /// Full commit id of HEAD.
    fn revision(&self) -> Result<String, StampError>;
}

/// Talks to the `git` binary on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: Option<PathBuf>,
}

impl GitCli {
    pub fn new(repo_dir: Option<PathBuf>) -> Self {
        Self { repo_dir }
    }

    /// Runs from `BUILD_WORKING_DIRECTORY` when present, i.e. the user's checkout.
    pub fn for_env(env: &BuildEnv) -> Self {
        Self::new(env.working_directory().map(Path::to_path_buf))
    }

    fn run(&self, args: &[&str]) -> Result<String, StampError> {
        let mut cmd = Command::new("git");
        cmd.args(args).stdin(Stdio::null());
        if let Some(dir) = &self.repo_dir {
            cmd.current_dir(dir);
        }
        debug!(?args, dir = ?self.repo_dir, "running git");
        let output = cmd.output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StampError::GitNotFound,
            _ => StampError::Io(e),
        })?;
        if !output.status.success() {
            return Err(StampError::Git {
                args: args.iter().map(|a| a.to_string()).collect(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Vcs for GitCli {
    fn status(&self) -> Result<TreeStatus, StampError> {
        let out = self.run(&["status", "--porcelain"])?;
        Ok(if out.trim().is_empty() {
            TreeStatus::Clean
        } else {
            TreeStatus::Dirty
        })
    }

    fn revision(&self) -> Result<String, StampError> {
        self.run(&["rev-parse", "HEAD"])
            .map(|out| out.trim().to_string())
    }
}

/// Cuts a commit id down to [`REVISION_WIDTH`] lowercase hex digits.
pub fn short_revision(full: &str) -> Result<String, StampError> {
    let full = full.trim();
    if full.len() < REVISION_WIDTH || !full.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StampError::MalformedRevision(full.to_string()));
    }
    Ok(full[..REVISION_WIDTH].to_ascii_lowercase())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StampOptions {
    /// Also emit the CI run number.
    pub run_number: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stamp {
    entries: Vec<(String, String)>,
}

impl Stamp {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "{self}")?;
        out.flush()
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key} {value}")?;
        }
        Ok(())
    }
}

pub fn workspace_status(
    vcs: &dyn Vcs,
    env: &BuildEnv,
    options: StampOptions,
) -> Result<Stamp, StampError> {
    let mut stamp = Stamp::default();
    stamp.push(GIT_STATUS_KEY, vcs.status()?.as_str());
    stamp.push(GIT_REVISION_KEY, short_revision(&vcs.revision()?)?);
    if options.run_number {
        stamp.push(BUILD_RUN_KEY, env.run_number());
    }
    Ok(stamp)
}
