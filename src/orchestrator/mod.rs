//! Decides what to (re)build and records the outcome.
//!
//! One [`BuildOrchestrator::run`] call is one orchestration run:
//!
//! 1. Fetch (and, when tracking every branch, prune local branches whose
//!    remote is gone).
//! 2. For each tracked branch the pipeline applies to: check it out, reset it
//!    to its remote head, and build it unless the skip rule says the last
//!    recorded build already covers this commit.
//! 3. Append exactly one history record per build.
//!
//! Git failures end the run early with a [`RunError`]; pipeline failures and
//! panics become failed records and the run continues with the next branch.

use std::any::Any;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::git::{CommandRunner, GitCli, RepoStateTracker, TrackerError};
use crate::persistence::{BuildHistory, HistoryError};
use crate::pipeline::{BuildContext, BuildPipeline};
use crate::types::{BuildFailure, BuildOutcome, BuildRecord, Sha};

/// Which branches a run considers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrackingMode {
    /// Every branch on the remote; local-only branches are pruned.
    #[default]
    All,
    /// One designated branch; other branches are left alone.
    Single { branch: String },
}

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// The scan at process start. Also retries failed builds of unchanged
    /// commits.
    Startup,
    /// A change notification.
    Webhook,
}

/// What a run did with one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    /// The pipeline ran and one record was appended.
    Built { hash: Sha, succeeded: bool },
    /// The last record already covers this commit.
    Unchanged { hash: Sha },
    /// The pipeline does not build this branch.
    NotApplicable,
    /// The branch had no local commit after reset.
    NoLocalCommit,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Local branches deleted because their remote was gone.
    pub pruned: Vec<String>,
    /// Per-branch outcomes, in processing order.
    pub branches: Vec<(String, BranchOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, branch: &str) -> Option<&BranchOutcome> {
        self.branches
            .iter()
            .find(|(name, _)| name == branch)
            .map(|(_, outcome)| outcome)
    }

    /// Number of branches the pipeline ran for.
    pub fn built(&self) -> usize {
        self.branches
            .iter()
            .filter(|(_, o)| matches!(o, BranchOutcome::Built { .. }))
            .count()
    }

    /// Number of builds that failed.
    pub fn failed(&self) -> usize {
        self.branches
            .iter()
            .filter(|(_, o)| matches!(o, BranchOutcome::Built { succeeded: false, .. }))
            .count()
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("history writer task failed: {0}")]
    HistoryTask(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, RunError>;

/// Whether `hash` needs no build given the branch's last record.
///
/// A build is skipped when the last record is for the same commit and either
/// it succeeded or this is not a startup run.
pub fn should_skip(last: Option<&BuildRecord>, hash: &Sha, kind: RunKind) -> bool {
    last.is_some_and(|record| {
        record.hash == *hash && (record.succeeded() || kind != RunKind::Startup)
    })
}

/// Runs orchestration over one tracker, history and pipeline.
pub struct BuildOrchestrator<P, R = GitCli> {
    tracker: Arc<RepoStateTracker<R>>,
    history: Arc<BuildHistory>,
    pipeline: Arc<P>,
    mode: TrackingMode,
}

impl<P: BuildPipeline, R: CommandRunner> BuildOrchestrator<P, R> {
    pub fn new(
        tracker: Arc<RepoStateTracker<R>>,
        history: Arc<BuildHistory>,
        pipeline: P,
        mode: TrackingMode,
    ) -> Self {
        BuildOrchestrator {
            tracker,
            history,
            pipeline: Arc::new(pipeline),
            mode,
        }
    }

    /// Performs one orchestration run.
    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn run(&self, kind: RunKind) -> Result<RunReport> {
        let mut report = RunReport::default();

        let targets: Vec<String> = match &self.mode {
            TrackingMode::All => {
                report.pruned = self.tracker.fetch_and_prune().await?;
                self.tracker.branches().await?.into_keys().collect()
            }
            TrackingMode::Single { branch } => {
                self.tracker.fetch().await?;
                vec![branch.clone()]
            }
        };

        for branch in targets {
            let outcome = self.run_branch(&branch, kind).await?;
            report.branches.push((branch, outcome));
        }

        info!(
            branches = report.branches.len(),
            built = report.built(),
            failed = report.failed(),
            pruned = report.pruned.len(),
            "Run complete"
        );
        Ok(report)
    }

    async fn run_branch(&self, branch: &str, kind: RunKind) -> Result<BranchOutcome> {
        if !self.pipeline.applies_to(branch) {
            debug!(branch, "Pipeline does not apply, build skipped");
            return Ok(BranchOutcome::NotApplicable);
        }

        self.tracker.checkout(branch).await?;
        self.tracker.reset_hard_to_remote(branch).await?;

        let Some(hash) = self
            .tracker
            .branch(branch)
            .await?
            .and_then(|b| b.local_hash)
        else {
            warn!(branch, "No local commit after reset");
            return Ok(BranchOutcome::NoLocalCommit);
        };

        let last = self.history.last_for(branch);
        if should_skip(last.as_ref(), &hash, kind) {
            info!(branch, hash = %hash.short(), "No changes since last build");
            return Ok(BranchOutcome::Unchanged { hash });
        }

        info!(branch, hash = %hash.short(), "Building");
        let ctx = BuildContext {
            branch: branch.to_string(),
            hash: hash.clone(),
            workdir: self.tracker.workdir().to_path_buf(),
            history: self.history.for_branch(branch),
        };
        let outcome = self.build(ctx).await;

        let record = self.record(branch, &hash, outcome).await?;
        match &record.outcome {
            BuildOutcome::Succeeded { result } => {
                info!(branch, hash = %hash.short(), duration_ms = result.duration_ms, "Build succeeded");
            }
            BuildOutcome::Failed { error } => {
                warn!(
                    branch,
                    hash = %hash.short(),
                    kind = %error.kind,
                    message = %error.message,
                    "Build failed"
                );
            }
        }

        Ok(BranchOutcome::Built {
            hash,
            succeeded: record.succeeded(),
        })
    }

    /// Appends on the blocking pool, off the runtime threads.
    async fn record(&self, branch: &str, hash: &Sha, outcome: BuildOutcome) -> Result<BuildRecord> {
        let history = Arc::clone(&self.history);
        let (branch, hash) = (branch.to_string(), hash.clone());
        let record = tokio::task::spawn_blocking(move || history.append(&branch, &hash, outcome)).await??;
        Ok(record)
    }

    /// Runs the pipeline on its own task so a panic becomes a failed build.
    async fn build(&self, ctx: BuildContext) -> BuildOutcome {
        let pipeline = Arc::clone(&self.pipeline);
        match tokio::spawn(async move { pipeline.build(ctx).await }).await {
            Ok(Ok(result)) => BuildOutcome::Succeeded { result },
            Ok(Err(error)) => BuildOutcome::Failed { error },
            Err(join_error) => {
                let detail = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                BuildOutcome::Failed {
                    error: BuildFailure::new(BuildFailure::PANIC, "build pipeline panicked")
                        .with_detail(detail),
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "non-string panic payload".to_string(), |s| s.to_string()),
    }
}
