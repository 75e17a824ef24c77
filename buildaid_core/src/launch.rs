use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("'{}' not found", .0.display())]
    NotFound(PathBuf),
    #[error("'{}' is not executable", .0.display())]
    PermissionDenied(PathBuf),
    #[error("failed to launch '{}': {source}", program.display())]
    Io {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    fn from_io(program: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound if !program.exists() => {
                LaunchError::NotFound(program.to_path_buf())
            }
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied(program.to_path_buf()),
            _ => LaunchError::Io {
                program: program.to_path_buf(),
                source: err,
            },
        }
    }
}

/// A fully resolved program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub argv0: OsString,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let argv0 = program
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| program.as_os_str().to_os_string());
        Self {
            program,
            argv0,
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn argv0(mut self, argv0: impl Into<OsString>) -> Self {
        self.argv0 = argv0.into();
        self
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.arg0(&self.argv0);
        }
        if let Some(cwd) = &self.working_dir {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exited {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl Exited {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code to hand back to our own caller; signals map to `128 + signo`.
    pub fn exit_code(&self) -> u8 {
        match (self.code, self.signal) {
            (Some(code), _) => code.clamp(0, 255) as u8,
            (None, Some(signal)) => (128 + signal).clamp(0, 255) as u8,
            (None, None) => 1,
        }
    }

    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("Exited with code {code}"),
            (None, Some(signal)) => format!("Terminated by signal {signal}"),
            (None, None) => "Exited abnormally".to_string(),
        }
    }
}

pub trait Launcher {
    /// Runs `invocation`. Implementations that replace the current process
    /// only ever return an error.
    fn launch(&mut self, invocation: &Invocation) -> Result<Exited, LaunchError>;
}

/// Spawns the program as a child and waits for it.
#[derive(Debug, Default)]
pub struct SpawnLauncher;

impl Launcher for SpawnLauncher {
    fn launch(&mut self, invocation: &Invocation) -> Result<Exited, LaunchError> {
        debug!(program = %invocation.program.display(), args = ?invocation.args, "spawning");
        let status = invocation
            .command()
            .status()
            .map_err(|e| LaunchError::from_io(&invocation.program, e))?;
        let exited = Exited::from_status(status);
        if !exited.success() {
            warn!(program = %invocation.program.display(), "{}", exited.describe());
        }
        Ok(exited)
    }
}

/// Replaces the current process image with the program.
///
/// Off unix there is no `execv`, so this degrades to spawn-and-wait and the
/// caller is expected to exit with [`Exited::exit_code`].
#[derive(Debug, Default)]
pub struct ExecLauncher;

impl Launcher for ExecLauncher {
    #[cfg(unix)]
    fn launch(&mut self, invocation: &Invocation) -> Result<Exited, LaunchError> {
        use std::os::unix::process::CommandExt;

        debug!(program = %invocation.program.display(), args = ?invocation.args, "exec");
        let err = invocation.command().exec();
        Err(LaunchError::from_io(&invocation.program, err))
    }

    #[cfg(not(unix))]
    fn launch(&mut self, invocation: &Invocation) -> Result<Exited, LaunchError> {
        SpawnLauncher.launch(invocation)
    }
}
