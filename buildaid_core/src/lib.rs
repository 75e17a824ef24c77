pub mod comb;
pub mod config;
pub mod env;
pub mod fuzz;
pub mod launch;
pub mod lint;
pub mod runfiles;
pub mod stamp;

pub use comb::{CombError, CombTable};
pub use config::BuildaidConfig;
pub use env::BuildEnv;
pub use fuzz::{ArtifactLayout, FuzzError, FuzzPlan, FuzzRequest};
pub use launch::{ExecLauncher, Exited, Invocation, LaunchError, Launcher, SpawnLauncher};
pub use lint::{LintConfig, LintError, Linter};
pub use runfiles::{Runfiles, RunfilesError};
pub use stamp::{GitCli, Stamp, StampError, StampOptions, TreeStatus, Vcs};
