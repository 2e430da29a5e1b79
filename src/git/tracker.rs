//! Serialized branch-state tracking over one shared working copy.
//!
//! [`RepoStateTracker`] owns the working copy. Every operation takes the
//! tracker's FIFO lock for its whole duration, so at most one git command
//! runs against the working copy at a time and operations complete in the
//! order they were requested.
//!
//! The branch mapping is only updated after the git commands behind an
//! operation have succeeded. A failed operation leaves the previous mapping
//! in place.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument};

use super::listing::{parse_local_branches, parse_remote_branches};
use super::{CommandOutput, CommandRunner, GitCli, REMOTE, describe_exit, display_command};
use crate::types::{Branch, BranchMap, InvalidSha, Sha};

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The working copy is missing or is not a git repository. Once
    /// returned, every later operation on the same tracker returns it too.
    #[error("{path} is not a usable git repository: {reason}")]
    InvalidRepository { path: PathBuf, reason: String },

    /// The branch is not in the current mapping.
    #[error("unknown branch: {0}")]
    BranchNotFound(String),

    /// A reset was requested for a branch that is not checked out.
    #[error("branch {0} is not checked out")]
    NotCheckedOut(String),

    /// A git command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// A git command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    /// `git rev-parse` printed something that is not a commit hash.
    #[error("`{command}` printed an invalid hash: {source}")]
    InvalidHash {
        command: String,
        #[source]
        source: InvalidSha,
    },
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Tracks local and remote branch heads of one working copy.
pub struct RepoStateTracker<R = GitCli> {
    workdir: PathBuf,
    runner: R,
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    /// Outcome of the one-time repository check; `Err` holds the reason.
    validation: Option<std::result::Result<(), String>>,
    branches: BranchMap,
}

impl<R: CommandRunner> RepoStateTracker<R> {
    pub fn new(workdir: impl Into<PathBuf>, runner: R) -> Self {
        RepoStateTracker {
            workdir: workdir.into(),
            runner,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Checks that the working copy is a git repository.
    ///
    /// Runs at most once per tracker; every other operation calls it
    /// implicitly.
    pub async fn ensure_valid(&self) -> Result<()> {
        self.acquire().await.map(|_| ())
    }

    /// Fetches every remote and rebuilds the branch mapping from scratch.
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    pub async fn refresh_branches(&self) -> Result<()> {
        let mut state = self.acquire().await?;
        self.refresh_locked(&mut state).await
    }

    /// Fetch and refresh, for single-branch tracking.
    pub async fn fetch(&self) -> Result<()> {
        self.refresh_branches().await
    }

    /// Fetch, refresh, then delete local branches whose remote is gone.
    ///
    /// Returns the names of the deleted branches.
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    pub async fn fetch_and_prune(&self) -> Result<Vec<String>> {
        let mut state = self.acquire().await?;
        self.refresh_locked(&mut state).await?;
        self.prune_locked(&mut state).await
    }

    /// Checks out `name`, creating a tracking branch if it only exists on the
    /// remote. No git command runs if `name` is already current.
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    pub async fn checkout(&self, name: &str) -> Result<()> {
        let mut state = self.acquire().await?;
        let branch = state
            .branches
            .get(name)
            .ok_or_else(|| TrackerError::BranchNotFound(name.to_string()))?;

        if branch.is_current {
            debug!(branch = name, "Already checked out");
            return Ok(());
        }

        let creates_local = branch.local_hash.is_none();
        if creates_local {
            let upstream = format!("{REMOTE}/{name}");
            self.git(&["checkout", "-b", name, "--track", &upstream])
                .await?;
        } else {
            self.git(&["checkout", name]).await?;
        }

        for branch in state.branches.values_mut() {
            branch.is_current = false;
        }
        if let Some(branch) = state.branches.get_mut(name) {
            branch.is_current = true;
            if creates_local {
                branch.local_hash = branch.remote_hash.clone();
            }
        }
        debug!(branch = name, created = creates_local, "Checked out branch");
        Ok(())
    }

    /// Hard-resets the checked-out branch `name` to its remote head.
    ///
    /// No git command runs if the local and remote heads already match.
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    pub async fn reset_hard_to_remote(&self, name: &str) -> Result<()> {
        let mut state = self.acquire().await?;
        let branch = state
            .branches
            .get(name)
            .ok_or_else(|| TrackerError::BranchNotFound(name.to_string()))?;

        if branch.is_in_sync() {
            debug!(branch = name, "Already at remote head");
            return Ok(());
        }
        if !branch.is_current {
            return Err(TrackerError::NotCheckedOut(name.to_string()));
        }

        let upstream = format!("{REMOTE}/{name}");
        self.git(&["reset", "--hard", &upstream]).await?;

        if let Some(branch) = state.branches.get_mut(name) {
            branch.local_hash = branch.remote_hash.clone();
            info!(
                branch = name,
                hash = %branch.local_hash.as_ref().map_or("-", Sha::short),
                "Reset to remote head"
            );
        }
        Ok(())
    }

    /// Detaches HEAD and force-deletes every local branch without a remote
    /// counterpart.
    ///
    /// Acts on the mapping from the last refresh. Returns the names of the
    /// deleted branches.
    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    pub async fn prune_orphaned_local_branches(&self) -> Result<Vec<String>> {
        let mut state = self.acquire().await?;
        self.prune_locked(&mut state).await
    }

    /// Snapshot of the branch mapping.
    pub async fn branches(&self) -> Result<BranchMap> {
        Ok(self.acquire().await?.branches.clone())
    }

    pub async fn branch(&self, name: &str) -> Result<Option<Branch>> {
        Ok(self.acquire().await?.branches.get(name).cloned())
    }

    // ─── Internals (callers hold the lock) ───────────────────────────────────

    /// Takes the queue slot, validating the repository on first use.
    async fn acquire(&self) -> Result<MutexGuard<'_, TrackerState>> {
        let mut state = self.state.lock().await;

        let validation = match &state.validation {
            Some(cached) => cached.clone(),
            None => {
                let outcome = self.validate().await;
                if let Err(reason) = &outcome {
                    error!(workdir = %self.workdir.display(), %reason, "Invalid repository");
                }
                state.validation = Some(outcome.clone());
                outcome
            }
        };

        validation.map_err(|reason| TrackerError::InvalidRepository {
            path: self.workdir.clone(),
            reason,
        })?;
        Ok(state)
    }

    async fn validate(&self) -> std::result::Result<(), String> {
        match self.runner.run(&["status", "--porcelain"], &self.workdir).await {
            Ok(output) if output.is_success() => Ok(()),
            Ok(output) => Err(output.stderr.trim().to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn refresh_locked(&self, state: &mut TrackerState) -> Result<()> {
        self.git(&["fetch", "--all", "--prune"]).await?;

        let mut branches = BranchMap::new();

        let local = self.git(&["branch"]).await?;
        for (name, is_current) in parse_local_branches(&local.stdout) {
            let hash = self.rev_parse(&format!("refs/heads/{name}")).await?;
            branches.insert(
                name,
                Branch {
                    local_hash: Some(hash),
                    remote_hash: None,
                    is_current,
                },
            );
        }

        let remote = self.git(&["branch", "--remotes"]).await?;
        for name in parse_remote_branches(&remote.stdout) {
            let hash = self
                .rev_parse(&format!("refs/remotes/{REMOTE}/{name}"))
                .await?;
            branches.entry(name).or_default().remote_hash = Some(hash);
        }

        debug!(branches = branches.len(), "Refreshed branch mapping");
        state.branches = branches;
        Ok(())
    }

    async fn prune_locked(&self, state: &mut TrackerState) -> Result<Vec<String>> {
        let orphans: Vec<String> = state
            .branches
            .iter()
            .filter(|(_, branch)| branch.is_orphaned())
            .map(|(name, _)| name.clone())
            .collect();

        // The current branch cannot be deleted while checked out.
        self.git(&["checkout", "--detach"]).await?;
        for branch in state.branches.values_mut() {
            branch.is_current = false;
        }

        let mut pruned = Vec::with_capacity(orphans.len());
        for name in orphans {
            self.git(&["branch", "-D", &name]).await?;
            state.branches.remove(&name);
            info!(branch = %name, "Deleted local branch with no remote");
            pruned.push(name);
        }
        Ok(pruned)
    }

    async fn rev_parse(&self, reference: &str) -> Result<Sha> {
        let args = ["rev-parse", "--verify", reference];
        let output = self.git(&args).await?;
        Sha::parse(&output.stdout).map_err(|source| TrackerError::InvalidHash {
            command: display_command(&args),
            source,
        })
    }

    /// Runs one git command, mapping a non-zero exit to an error.
    async fn git(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self
            .runner
            .run(args, &self.workdir)
            .await
            .map_err(|source| TrackerError::Io {
                command: display_command(args),
                source,
            })?;

        if output.is_success() {
            Ok(output)
        } else {
            Err(TrackerError::CommandFailed {
                command: display_command(args),
                status: describe_exit(output.code),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}
