//! Minimal runfiles lookup.
//!
//! A binary launched by the build system finds its data dependencies either
//! through a manifest file (`<rlocation> <real path>` per line) or through a
//! symlink tree rooted at a runfiles directory.
//!
//! Paths are written with apparent repository names. The `_repo_mapping`
//! file at the runfiles root translates them to canonical names, the same
//! way the `runfiles` crate from rules_rust does.

use crate::env::BuildEnv;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RunfilesError {
    #[error("runfiles not found (set RUNFILES_MANIFEST_FILE or RUNFILES_DIR)")]
    NotFound,
    #[error("failed to read runfiles manifest '{}': {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

const REPO_MAPPING: &str = "_repo_mapping";

/// Canonical name of the main repository as seen from a source repository.
const MAIN_REPO: &str = "";

#[derive(Debug, Clone)]
enum Mode {
    Manifest(HashMap<String, PathBuf>),
    Directory(PathBuf),
}

/// `(source canonical name, apparent name) -> target canonical name`
type RepoMapping = HashMap<(String, String), String>;

#[derive(Debug, Clone)]
pub struct Runfiles {
    mode: Mode,
    repo_mapping: RepoMapping,
}

impl Runfiles {
    /// Discovers runfiles from the environment first, then next to `argv0`.
    pub fn create(env: &BuildEnv, argv0: Option<&Path>) -> Result<Self, RunfilesError> {
        if let Some(manifest) = &env.runfiles_manifest_file {
            return Self::from_manifest(manifest);
        }
        if let Some(dir) = env.runfiles_dir.as_ref().or(env.test_srcdir.as_ref()) {
            return Ok(Self::from_directory(dir.clone()));
        }
        if let Some(argv0) = argv0 {
            let mut manifest = argv0.as_os_str().to_os_string();
            manifest.push(".runfiles_manifest");
            let manifest = PathBuf::from(manifest);
            if manifest.is_file() {
                return Self::from_manifest(&manifest);
            }
            let mut dir = argv0.as_os_str().to_os_string();
            dir.push(".runfiles");
            let dir = PathBuf::from(dir);
            if dir.join("MANIFEST").is_file() {
                return Self::from_manifest(&dir.join("MANIFEST"));
            }
            if dir.is_dir() {
                return Ok(Self::from_directory(dir));
            }
        }
        Err(RunfilesError::NotFound)
    }

    pub fn from_manifest(path: &Path) -> Result<Self, RunfilesError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunfilesError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(manifest = %path.display(), "using runfiles manifest");
        Ok(Self::with_mode(Mode::Manifest(parse_manifest(&content))))
    }

    pub fn from_directory(dir: PathBuf) -> Self {
        debug!(dir = %dir.display(), "using runfiles directory");
        Self::with_mode(Mode::Directory(dir))
    }

    fn with_mode(mode: Mode) -> Self {
        let mut runfiles = Self {
            mode,
            repo_mapping: RepoMapping::new(),
        };
        if let Some(path) = runfiles.lookup(REPO_MAPPING) {
            match std::fs::read_to_string(&path) {
                Ok(content) => runfiles.repo_mapping = parse_repo_mapping(&content),
                Err(e) => debug!(path = %path.display(), "no repository mapping: {e}"),
            }
        }
        runfiles
    }

    /// Maps a runfiles path such as `repo/pkg/file`, written from the main
    /// repository, to a real path.
    pub fn rlocation(&self, path: &str) -> Option<PathBuf> {
        self.rlocation_from(path, MAIN_REPO)
    }

    /// Like [`Runfiles::rlocation`], with `repo` in `path` read as an
    /// apparent name visible from `source_repo`.
    pub fn rlocation_from(&self, path: &str, source_repo: &str) -> Option<PathBuf> {
        if Path::new(path).is_absolute() {
            return Some(PathBuf::from(path));
        }
        let Some((apparent, rest)) = path.split_once('/') else {
            return self.lookup(path);
        };
        match self
            .repo_mapping
            .get(&(source_repo.to_string(), apparent.to_string()))
        {
            Some(canonical) => self.lookup(&format!("{canonical}/{rest}")),
            None => self.lookup(path),
        }
    }

    fn lookup(&self, path: &str) -> Option<PathBuf> {
        match &self.mode {
            Mode::Manifest(entries) => entries.get(path).cloned(),
            Mode::Directory(root) => {
                let candidate = root.join(path);
                candidate.exists().then_some(candidate)
            }
        }
    }
}

fn unescape(s: &str, spaces: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') if spaces => out.push(' '),
            Some('n') => out.push('\n'),
            Some('b') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// One `source,apparent,target` triple per line.
fn parse_repo_mapping(content: &str) -> RepoMapping {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, ',');
            let source = fields.next()?;
            let apparent = fields.next()?;
            let target = fields.next()?;
            Some(((source.to_string(), apparent.to_string()), target.to_string()))
        })
        .collect()
}

/// Lines starting with a space carry escaped keys and values.
fn parse_manifest(content: &str) -> HashMap<String, PathBuf> {
    let mut entries = HashMap::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = match line.strip_prefix(' ') {
            Some(escaped) => {
                let (k, v) = escaped.split_once(' ').unwrap_or((escaped, ""));
                (unescape(k, true), unescape(v, false))
            }
            None => {
                let (k, v) = line.split_once(' ').unwrap_or((line, ""));
                (k.to_string(), v.to_string())
            }
        };
        entries.insert(key, PathBuf::from(value));
    }
    entries
}
