//! A pipeline of shell commands, configured per deployment.
//!
//! Steps run strictly in order in the working copy (or a subdirectory of
//! it). The first failing step ends the build. A step fails if it exits
//! non-zero, is killed by a signal, or exits zero but writes anything at all
//! to stderr.
//!
//! # Placeholders
//!
//! Step commands may reference `{branch}`, `{hash}` and `{short_hash}` (the
//! first six characters of the hash). Substituted values are shell-quoted, so
//! each expands to exactly one word. The same values are exported as
//! `ROBOT_BRANCH`, `ROBOT_HASH` and `ROBOT_SHORT_HASH`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{BuildContext, BuildPipeline};
use crate::git::describe_exit;
use crate::types::{BuildFailure, BuildSummary, StepSummary};

/// Length of the `{short_hash}` placeholder.
const SHORT_HASH_LEN: usize = 6;

/// The `[pipeline]` configuration table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Branches to build. Empty means every tracked branch.
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// One `[[pipeline.steps]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub name: String,

    /// Shell command line, run with `sh -c`.
    pub command: String,

    /// Working directory relative to the working copy.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Runs the configured steps through the system shell.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    config: PipelineConfig,
}

impl CommandPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        CommandPipeline { config }
    }

    #[instrument(skip_all, fields(step = %step.name))]
    async fn run_step(&self, step: &StepConfig, ctx: &BuildContext) -> Result<StepSummary, BuildFailure> {
        let short_hash = ctx.hash.prefix(SHORT_HASH_LEN);
        let command = step
            .command
            .replace("{branch}", &shell_quote(&ctx.branch))
            .replace("{short_hash}", &shell_quote(short_hash))
            .replace("{hash}", &shell_quote(ctx.hash.as_str()));
        let cwd = match &step.cwd {
            Some(dir) => ctx.workdir.join(dir),
            None => ctx.workdir.clone(),
        };

        info!(%command, cwd = %cwd.display(), "Running step");
        let started = Instant::now();

        let output = shell(&command)
            .current_dir(&cwd)
            .env("ROBOT_BRANCH", &ctx.branch)
            .env("ROBOT_HASH", ctx.hash.as_str())
            .env("ROBOT_SHORT_HASH", short_hash)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                BuildFailure::new(
                    BuildFailure::SPAWN_FAILED,
                    format!("step {} could not be started", step.name),
                )
                .with_detail(e.to_string())
            })?;

        let duration_ms = elapsed_ms(started);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!(output = %stdout.trim_end(), "Step stdout");
        }
        if !stderr.is_empty() {
            warn!(output = %stderr.trim_end(), "Step stderr");
        }

        classify_step(&step.name, output.status.code(), &stderr)?;

        info!(duration_ms, "Step succeeded");
        Ok(StepSummary {
            name: step.name.clone(),
            duration_ms,
        })
    }
}

impl BuildPipeline for CommandPipeline {
    fn applies_to(&self, branch: &str) -> bool {
        self.config.branches.is_empty() || self.config.branches.iter().any(|b| b == branch)
    }

    async fn build(&self, ctx: BuildContext) -> Result<BuildSummary, BuildFailure> {
        let started = Instant::now();
        let mut steps = Vec::with_capacity(self.config.steps.len());

        for step in &self.config.steps {
            steps.push(self.run_step(step, &ctx).await?);
        }

        Ok(BuildSummary {
            steps,
            duration_ms: elapsed_ms(started),
        })
    }
}

/// Decides whether a finished step succeeded.
///
/// Success means exit code 0 *and* an empty stderr. A lone newline counts as
/// output.
pub fn classify_step(name: &str, code: Option<i32>, stderr: &str) -> Result<(), BuildFailure> {
    let message = match code {
        Some(0) if stderr.is_empty() => return Ok(()),
        Some(0) => format!("step {name} wrote to stderr"),
        other => format!("step {name} failed ({})", describe_exit(other)),
    };

    let failure = BuildFailure::new(BuildFailure::STEP_FAILED, message);
    let detail = stderr.trim();
    Err(if detail.is_empty() {
        failure
    } else {
        failure.with_detail(detail)
    })
}

/// Quotes `value` as a single POSIX shell word.
fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/'));
    if plain {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Steps always run under `sh -c`; placeholder quoting assumes POSIX rules.
fn shell(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
