//! OS jail facility.
//!
//! The pod layer never talks to the kernel directly. It renders a jail
//! configuration file and hands it to jail(8), asks jls(8) about live jails,
//! and starts applications through the stage2 launcher. [`JailFacility`] is
//! that seam; [`JailCommand`] drives the real tools.
//!
//! ```text
//! jail -f <pod>/jail.conf <-q|-v> -c <name>     create
//! jail -f <pod>/jail.conf <-q|-v> -r <name>     remove
//! jls -d -j <name> jid dying                    query
//! <libexec>/stage2 -jid N -user U ... <exec>    launch
//! ```

use crate::command;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use tracing::debug;

/// Live state of a jail as reported by the OS.
///
/// Derived per query and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JailStatus {
    /// Numeric jail id; 0 when no jail exists.
    pub jid: u32,
    /// Jail was removed but still has processes being reaped.
    pub dying: bool,
}

impl JailStatus {
    /// Status reported for a jail that does not exist.
    pub const NONE: JailStatus = JailStatus {
        jid: 0,
        dying: false,
    };

    pub fn is_attached(&self) -> bool {
        self.jid != 0
    }
}

/// jail(8) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JailOp {
    Create,
    Remove,
}

impl JailOp {
    /// Command line flag selecting the operation.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Create => "-c",
            Self::Remove => "-r",
        }
    }
}

impl std::fmt::Display for JailOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Builds the jail(8) argument vector.
pub fn jail_args(conf: &Path, verbose: bool, op: JailOp, name: &str) -> Vec<String> {
    vec![
        "-f".to_string(),
        conf.to_string_lossy().into_owned(),
        if verbose { "-v" } else { "-q" }.to_string(),
        op.flag().to_string(),
        name.to_string(),
    ]
}

/// Access to the OS jail facility.
#[async_trait]
pub trait JailFacility: Send + Sync {
    /// Queries the live state of a jail by name.
    ///
    /// Returns `None` if no such jail exists, dying jails included.
    async fn query(&self, name: &str) -> Result<Option<JailStatus>>;

    /// Creates or removes a jail from a configuration file.
    async fn run_jail(&self, conf: &Path, verbose: bool, op: JailOp, name: &str) -> Result<()>;

    /// Runs the launcher program with a prepared argument vector.
    async fn stage2(&self, program: &Path, args: &[String]) -> Result<()>;
}

/// [`JailFacility`] backed by jail(8), jls(8) and the stage2 launcher.
#[derive(Debug, Clone, Default)]
pub struct JailCommand;

impl JailCommand {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JailFacility for JailCommand {
    async fn query(&self, name: &str) -> Result<Option<JailStatus>> {
        let args = ["-d", "-j", name, "jid", "dying"];
        let output = tokio::process::Command::new("jls")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::CommandFailed {
                command: command::render(OsStr::new("jls"), &args[..]),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let reason = command::failure_reason(&output);
            if reason.contains("not found") {
                return Ok(None);
            }
            return Err(Error::CommandFailed {
                command: command::render(OsStr::new("jls"), &args[..]),
                reason,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_jls_line(&stdout).map(Some)
    }

    async fn run_jail(&self, conf: &Path, verbose: bool, op: JailOp, name: &str) -> Result<()> {
        debug!(jail = %name, op = %op, "Running jail(8)");
        command::output("jail", jail_args(conf, verbose, op, name).as_slice()).await?;
        Ok(())
    }

    async fn stage2(&self, program: &Path, args: &[String]) -> Result<()> {
        command::status(program, args).await
    }
}

/// Parses one `jid dying` line of jls(8) output.
pub fn parse_jls_line(line: &str) -> Result<JailStatus> {
    let malformed = || Error::CommandFailed {
        command: "jls".to_string(),
        reason: format!("unexpected output: {:?}", line.trim()),
    };

    let mut fields = line.split_whitespace();
    let jid = fields
        .next()
        .and_then(|f| f.parse::<u32>().ok())
        .ok_or_else(malformed)?;
    let dying = match fields.next() {
        Some("1" | "true") => true,
        Some("0" | "false") | None => false,
        Some(_) => return Err(malformed()),
    };
    Ok(JailStatus { jid, dying })
}
