//! Hand process control to the main application command.

use anyhow::{Context, Result, bail};
use std::process::Command;
use tracing::info;

/// Replace the current process with `command`.
///
/// On Unix this `exec`s and only returns on failure. Elsewhere the command is
/// run as a child and its exit code is forwarded.
pub fn handoff(command: &[String]) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("no command given");
    };

    info!(command = %program, args = ?args, "Handing off to main process");

    let mut cmd = Command::new(program);
    cmd.args(args);
    exec(cmd, program)
}

#[cfg(unix)]
fn exec(mut cmd: Command, program: &str) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let err = cmd.exec();
    Err(err).with_context(|| format!("Failed to execute {}", program))
}

#[cfg(not(unix))]
fn exec(mut cmd: Command, program: &str) -> Result<()> {
    let status = cmd
        .status()
        .with_context(|| format!("Failed to execute {}", program))?;
    std::process::exit(status.code().unwrap_or(1));
}
