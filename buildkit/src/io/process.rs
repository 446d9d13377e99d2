//! Helpers for running child processes with an optional timeout.
//!
//! Build tools stream a lot of output (compiler diagnostics, the viewer's own
//! logging), so children inherit stdout/stderr instead of being captured.

use std::process::{Command, ExitStatus};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How a child process finished.
#[derive(Debug, Clone, Copy)]
pub struct CommandStatus {
    pub status: ExitStatus,
    pub timed_out: bool,
}

impl CommandStatus {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Run a command to completion, killing it if `timeout` elapses first.
///
/// With `timeout = None` the call blocks until the child exits.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_command(mut cmd: Command, timeout: Option<Duration>) -> Result<CommandStatus> {
    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let Some(timeout) = timeout else {
        let status = child.wait().context("wait for command")?;
        debug!(exit_code = ?status.code(), "command finished");
        return Ok(CommandStatus {
            status,
            timed_out: false,
        });
    };

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandStatus { status, timed_out })
}
