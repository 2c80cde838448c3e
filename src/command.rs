//! External program invocation.
//!
//! No timeout is applied: a hang in jail(8), zfs(8) or the launcher hangs
//! the calling operation.

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Runs a program to completion and captures its output.
///
/// # Errors
///
/// `CommandFailed` if the program cannot be spawned or exits non-zero.
pub(crate) async fn output<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
) -> Result<Output> {
    let output = spawn(program.as_ref(), args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::CommandFailed {
            command: render(program.as_ref(), args),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::CommandFailed {
            command: render(program.as_ref(), args),
            reason: failure_reason(&output),
        });
    }
    Ok(output)
}

/// Runs a program with inherited stdio and waits for it.
///
/// Used for the app launcher so interactive consoles keep the terminal.
pub(crate) async fn status<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
) -> Result<()> {
    let status = spawn(program.as_ref(), args)
        .status()
        .await
        .map_err(|e| Error::CommandFailed {
            command: render(program.as_ref(), args),
            reason: e.to_string(),
        })?;

    if !status.success() {
        return Err(Error::CommandFailed {
            command: render(program.as_ref(), args),
            reason: format!("exit status {status}"),
        });
    }
    Ok(())
}

fn spawn<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> Command {
    debug!("exec: {}", render(program, args));
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Renders a command line for logs and errors.
pub(crate) fn render<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> String {
    let mut line = program.to_string_lossy().into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

pub(crate) fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr.to_string()
    }
}
