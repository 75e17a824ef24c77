use buildaid_core::comb::CombTable;
use buildaid_core::config::BuildaidConfig;
use buildaid_core::env::BuildEnv;
use buildaid_core::fuzz::{self, ArtifactLayout, FuzzRequest};
use buildaid_core::launch::{ExecLauncher, Invocation, Launcher};
use buildaid_core::lint::Linter;
use buildaid_core::runfiles::Runfiles;
use buildaid_core::stamp::{self, GitCli, StampOptions};

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const LOG_ENV: &str = "BUILDAID_LOG";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Helpers invoked by the build system", long_about = None)]
struct Cli {
    /// TOML config; defaults to ./buildaid.toml when present.
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fuzz target with an artifact directory prepared for it.
    Fuzz {
        #[arg(long, alias = "output_root")]
        output_root: Option<PathBuf>,
        /// Put artifacts of every target in one shared directory.
        #[arg(long)]
        flat: bool,
        fuzz_target: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        fuzz_args: Vec<OsString>,
    },
    /// Print workspace status lines for build stamping.
    Stamp {
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also emit the CI run number.
        #[arg(long)]
        run_number: bool,
    },
    /// Write the binomial coefficient table as JSON.
    Comb {
        #[arg(long)]
        size: Option<usize>,
        #[arg(long)]
        path: PathBuf,
    },
    /// Run the linter from runfiles with the workspace config.
    Lint {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}

/// Hands the process over to `invocation`; only comes back on failure or on
/// platforms without `exec`.
fn exec(invocation: &Invocation) -> anyhow::Result<ExitCode> {
    let exited = ExecLauncher
        .launch(invocation)
        .with_context(|| format!("Failed to run {}", invocation.program.display()))?;
    Ok(ExitCode::from(exited.exit_code()))
}

fn run_fuzz(
    config: &BuildaidConfig,
    env: &BuildEnv,
    output_root: Option<PathBuf>,
    flat: bool,
    fuzz_target: PathBuf,
    fuzz_args: Vec<OsString>,
) -> anyhow::Result<ExitCode> {
    let layout = if flat {
        ArtifactLayout::Flat
    } else {
        config.fuzz.layout
    };
    let request = FuzzRequest {
        output_root: output_root.or_else(|| config.fuzz.output_root.clone()),
        fuzz_target,
        fuzz_args,
        layout,
    };
    let plan = fuzz::plan(request, env)?;
    exec(&plan.invocation())
}

fn run_stamp(
    config: &BuildaidConfig,
    env: &BuildEnv,
    output: Option<PathBuf>,
    run_number: bool,
) -> anyhow::Result<ExitCode> {
    let options = StampOptions {
        run_number: run_number || config.stamp.run_number,
    };
    let vcs = GitCli::for_env(env);
    let status = stamp::workspace_status(&vcs, env, options)?;
    match output {
        Some(path) => {
            let path = env.resolve_from_invocation_dir(&path);
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create stamp file {}", path.display()))?;
            status.write_to(file)?;
        }
        None => status.write_to(std::io::stdout().lock())?,
    }
    Ok(ExitCode::SUCCESS)
}

fn run_comb(
    config: &BuildaidConfig,
    env: &BuildEnv,
    size: Option<usize>,
    path: &Path,
) -> anyhow::Result<ExitCode> {
    let size = size.unwrap_or(config.comb.size);
    let path = env.resolve_from_invocation_dir(path);
    CombTable::new(size)?
        .write_to_path(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(size, path = %path.display(), "wrote binomial table");
    Ok(ExitCode::SUCCESS)
}

fn run_lint(
    config: &BuildaidConfig,
    env: &BuildEnv,
    args: Vec<OsString>,
) -> anyhow::Result<ExitCode> {
    let argv0 = std::env::args_os().next().map(PathBuf::from);
    let runfiles = match Runfiles::create(env, argv0.as_deref()) {
        Ok(rf) => Some(rf),
        Err(e) => {
            debug!("{e}");
            None
        }
    };
    let invocation = Linter::new(runfiles.as_ref(), env, &config.lint).invocation(args)?;
    exec(&invocation)
}

fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let env = BuildEnv::from_process();
    let cwd = match env.working_directory() {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let config_file = cli
        .config_file
        .as_deref()
        .map(|p| env.resolve_from_invocation_dir(p));
    let config = BuildaidConfig::discover(config_file.as_deref(), &cwd)?;
    debug!(?config, "effective configuration");
    let env = env.capture(&config.lint.fallback_env);

    match cli.command {
        Command::Fuzz {
            output_root,
            flat,
            fuzz_target,
            fuzz_args,
        } => run_fuzz(&config, &env, output_root, flat, fuzz_target, fuzz_args),
        Command::Stamp { output, run_number } => run_stamp(&config, &env, output, run_number),
        Command::Comb { size, path } => run_comb(&config, &env, size, &path),
        Command::Lint { args } => run_lint(&config, &env, args),
    }
}
