//! Build pipelines.
//!
//! The orchestrator talks to a pipeline only through [`BuildPipeline`]. The
//! production implementation, [`CommandPipeline`], runs configured shell
//! steps in order.

pub mod command;

use std::future::Future;
use std::path::PathBuf;

pub use command::{CommandPipeline, PipelineConfig, StepConfig, classify_step};

use crate::types::{BuildFailure, BuildRecord, BuildSummary, Sha};

/// Everything a pipeline gets to know about the build it runs.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub branch: String,

    /// The commit checked out in `workdir`.
    pub hash: Sha,

    /// The working copy, already checked out and reset.
    pub workdir: PathBuf,

    /// Earlier records for `branch`, oldest first.
    pub history: Vec<BuildRecord>,
}

/// Builds one branch at one commit.
///
/// Implementations report failures as a [`BuildFailure`] value; the
/// orchestrator persists it. A panic inside `build` is caught by the
/// orchestrator and recorded as a failure too.
pub trait BuildPipeline: Send + Sync + 'static {
    /// Whether `branch` is built at all. Branches this returns `false` for
    /// are neither checked out nor recorded.
    fn applies_to(&self, _branch: &str) -> bool {
        true
    }

    fn build(
        &self,
        ctx: BuildContext,
    ) -> impl Future<Output = Result<BuildSummary, BuildFailure>> + Send;
}
