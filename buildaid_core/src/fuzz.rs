//! Runs a fuzz target binary the way the build system expects.
//!
//! The target is handed over as a runfiles-relative path, so it is resolved
//! before anything changes directory. Crash reproducers go to an artifact
//! directory that is created up front and passed to libFuzzer through
//! `-artifact_prefix`.

use crate::env::BuildEnv;
use crate::launch::Invocation;
use serde::Deserialize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const FUZZ_TARGET_SUFFIX: &str = "_fuzz_target";
const DEFAULT_OUTPUT_DIR: &str = "fuzzing";
const ARTIFACT_DIR: &str = "artifact";

#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("fuzz target '{}' not found: {source}", path.display())]
    TargetNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("fuzz target '{}' has no file name", .0.display())]
    InvalidTarget(PathBuf),
    #[error("failed to create artifact directory '{}': {source}", path.display())]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where reproducers land below the output root.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactLayout {
    /// `<root>/<fuzz test name>/artifact`
    #[default]
    PerTarget,
    /// `<root>/artifact`, shared by every target.
    Flat,
}

#[derive(Debug, Clone)]
pub struct FuzzRequest {
    pub output_root: Option<PathBuf>,
    pub fuzz_target: PathBuf,
    pub fuzz_args: Vec<OsString>,
    pub layout: ArtifactLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzPlan {
    pub target: PathBuf,
    pub name: String,
    pub artifact_prefix: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub fuzz_args: Vec<OsString>,
}

/// Strips the `_fuzz_target` suffix the build rule appends to the binary.
pub fn fuzz_test_name(target: &Path) -> Option<String> {
    let file_name = target.file_name()?.to_string_lossy();
    let file_name: &str = &file_name;
    Some(
        file_name
            .strip_suffix(FUZZ_TARGET_SUFFIX)
            .unwrap_or(file_name)
            .to_string(),
    )
}

/// Resolves the target, creates the artifact directory, and works out where
/// the fuzzer should run. Nothing is executed yet.
pub fn plan(request: FuzzRequest, env: &BuildEnv) -> Result<FuzzPlan, FuzzError> {
    let target = request.fuzz_target.canonicalize().map_err(|source| {
        FuzzError::TargetNotFound {
            path: request.fuzz_target.clone(),
            source,
        }
    })?;
    let name =
        fuzz_test_name(&target).ok_or_else(|| FuzzError::InvalidTarget(target.clone()))?;

    let output_root = match &request.output_root {
        Some(root) => env.resolve_from_invocation_dir(root),
        None => env.tmpdir().join(DEFAULT_OUTPUT_DIR),
    };
    let artifact_prefix = match request.layout {
        ArtifactLayout::PerTarget => output_root.join(&name).join(ARTIFACT_DIR),
        ArtifactLayout::Flat => output_root.join(ARTIFACT_DIR),
    };
    std::fs::create_dir_all(&artifact_prefix).map_err(|source| FuzzError::ArtifactDir {
        path: artifact_prefix.clone(),
        source,
    })?;
    debug!(artifact_prefix = %artifact_prefix.display(), "artifact directory ready");

    Ok(FuzzPlan {
        target,
        name,
        artifact_prefix,
        working_dir: env.working_directory().map(Path::to_path_buf),
        fuzz_args: request.fuzz_args,
    })
}

impl FuzzPlan {
    /// libFuzzer concatenates the prefix and the file name, hence the trailing slash.
    pub fn artifact_prefix_arg(&self) -> OsString {
        let mut arg = OsString::from("-artifact_prefix=");
        arg.push(self.artifact_prefix.as_os_str());
        if !self.artifact_prefix.as_os_str().to_string_lossy().ends_with('/') {
            arg.push("/");
        }
        arg
    }

    pub fn invocation(&self) -> Invocation {
        info!(
            fuzz_target = %self.target.display(),
            artifact_prefix = %self.artifact_prefix.display(),
            "running fuzz test {}",
            self.name
        );
        Invocation::new(&self.target)
            .argv0(self.name.as_str())
            .arg(self.artifact_prefix_arg())
            .args(self.fuzz_args.iter().cloned())
            .working_dir(self.working_dir.clone())
    }
}
