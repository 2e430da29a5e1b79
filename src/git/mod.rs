//! Git plumbing for the build robot.
//!
//! Every git invocation goes through the [`CommandRunner`] seam so the
//! tracker can be driven by a scripted runner in tests and by [`GitCli`] in
//! production.
//!
//! - [`tracker`]: serialized branch-state tracking over one working copy
//! - [`clone`]: first-start clone of the tracked repository

pub mod clone;
mod listing;
pub mod tracker;

use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Stdio;

pub use clone::{CloneError, CloneStatus, ensure_cloned};
pub use tracker::{RepoStateTracker, TrackerError};

/// Name of the remote every tracked branch is compared against.
pub const REMOTE: &str = "origin";

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        CommandOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A run that exited with `code` after printing `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs one git command in a working directory.
///
/// `args` excludes the leading `git`. A non-zero exit is reported through
/// [`CommandOutput::code`], not as an `Err`; `Err` means the process could
/// not be run at all.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        args: &[&str],
        workdir: &Path,
    ) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

/// Production [`CommandRunner`] that spawns the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    isolated: bool,
}

impl GitCli {
    pub fn new() -> Self {
        GitCli::default()
    }

    /// A runner that also ignores system and user git configuration
    /// (hooks, aliases, credential helpers), for reproducible behavior.
    pub fn isolated() -> Self {
        GitCli { isolated: true }
    }

    fn command(&self, workdir: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("git");
        cmd.current_dir(workdir)
            .stdin(Stdio::null())
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            // Branch listings are parsed; keep them untranslated.
            .env("LC_ALL", "C");

        if self.isolated {
            cmd.env("GIT_CONFIG_NOSYSTEM", "1")
                .env("GIT_CONFIG_GLOBAL", "/dev/null");
        }
        cmd
    }
}

impl CommandRunner for GitCli {
    async fn run(&self, args: &[&str], workdir: &Path) -> io::Result<CommandOutput> {
        let output = self.command(workdir).args(args).output().await?;
        Ok(output.into())
    }
}

/// Renders a git invocation for log lines and error messages.
pub(crate) fn display_command(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

/// Renders an exit code, e.g. `exit code 128` or `killed by signal`.
pub(crate) fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}
