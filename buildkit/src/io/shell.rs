//! Shell abstraction for running command strings.
//!
//! The [`Shell`] trait decouples orchestration from actually spawning
//! `sh -c` / `cmd /C`. Tests use a recording shell that never spawns
//! processes (see `test_support::RecordingShell`).

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::io::process::run_command;

/// Parameters for a shell invocation.
#[derive(Debug, Clone)]
pub struct ShellRequest {
    /// Command line, passed verbatim to the platform shell.
    pub command: String,
    /// Working directory for the shell process.
    pub workdir: PathBuf,
    /// Kill the command after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl ShellRequest {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of a finished shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellOutcome {
    pub code: Option<i32>,
    pub timed_out: bool,
}

impl ShellOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }
}

/// A shell command exited non-zero, was killed by a signal, or timed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailedError {
    pub command: String,
    pub workdir: PathBuf,
    pub code: Option<i32>,
    pub timed_out: bool,
}

impl fmt::Display for CommandFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            return write!(
                f,
                "command `{}` timed out (in {})",
                self.command,
                self.workdir.display()
            );
        }
        match self.code {
            Some(code) => write!(
                f,
                "command `{}` failed with exit code {} (in {})",
                self.command,
                code,
                self.workdir.display()
            ),
            None => write!(
                f,
                "command `{}` was terminated by a signal (in {})",
                self.command,
                self.workdir.display()
            ),
        }
    }
}

impl std::error::Error for CommandFailedError {}

/// Abstraction over command execution backends.
pub trait Shell {
    /// Run `request.command` and report how it finished.
    ///
    /// `Err` means the command could not be started at all; a non-zero exit
    /// is reported through [`ShellOutcome`].
    fn run(&self, request: &ShellRequest) -> Result<ShellOutcome>;
}

/// Shell that spawns the platform shell (`sh -c` or `cmd /C`).
pub struct SystemShell;

impl Shell for SystemShell {
    #[instrument(skip_all, fields(command = %request.command, workdir = %request.workdir.display()))]
    fn run(&self, request: &ShellRequest) -> Result<ShellOutcome> {
        info!("running shell command");
        let mut cmd = platform_shell(&request.command);
        cmd.current_dir(&request.workdir);
        let status = run_command(cmd, request.timeout)
            .with_context(|| format!("run `{}`", request.command))?;
        Ok(ShellOutcome {
            code: status.code(),
            timed_out: status.timed_out,
        })
    }
}

#[cfg(windows)]
fn platform_shell(command: &str) -> Command {
    use std::os::windows::process::CommandExt;

    // cmd.exe does its own parsing; the default quoting would turn `"` into `\"`.
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").raw_arg(command);
    cmd
}

#[cfg(not(windows))]
fn platform_shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

/// Run a command and turn any unsuccessful outcome into a [`CommandFailedError`].
pub fn run_checked<S: Shell + ?Sized>(shell: &S, request: &ShellRequest) -> Result<()> {
    let outcome = shell.run(request)?;
    if outcome.success() {
        return Ok(());
    }
    warn!(
        command = %request.command,
        exit_code = ?outcome.code,
        timed_out = outcome.timed_out,
        "shell command failed"
    );
    Err(CommandFailedError {
        command: request.command.clone(),
        workdir: request.workdir.clone(),
        code: outcome.code,
        timed_out: outcome.timed_out,
    }
    .into())
}
