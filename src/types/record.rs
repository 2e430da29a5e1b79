//! Build records as persisted in the history log.
//!
//! A record is either a success carrying a [`BuildSummary`] or a failure
//! carrying a [`BuildFailure`]. On disk both shapes share one flat object:
//!
//! ```json
//! {"seq":0,"ts":"2024-01-15T10:00:00Z","branch":"master","hash":"…","succeeded":true,"result":{"steps":[…],"duration_ms":812}}
//! {"seq":1,"ts":"2024-01-15T11:00:00Z","branch":"master","hash":"…","succeeded":false,"error":{"kind":"step_failed","message":"…","detail":"…"}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Sha;

/// Timing for one pipeline step that completed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub duration_ms: u64,
}

/// Payload of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub steps: Vec<StepSummary>,
    pub duration_ms: u64,
}

/// Structured description of a failed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFailure {
    /// Machine-readable category, e.g. [`BuildFailure::STEP_FAILED`].
    pub kind: String,

    /// Human-readable summary.
    pub message: String,

    /// Diagnostic output (usually the failing step's stderr).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BuildFailure {
    /// A step exited non-zero or wrote to stderr.
    pub const STEP_FAILED: &'static str = "step_failed";
    /// A step could not be started at all.
    pub const SPAWN_FAILED: &'static str = "spawn_failed";
    /// The pipeline panicked.
    pub const PANIC: &'static str = "panic";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        BuildFailure {
            kind: kind.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Outcome of one build attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded { result: BuildSummary },
    Failed { error: BuildFailure },
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded { .. })
    }
}

/// One entry in the build history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RecordRepr", try_from = "RecordRepr")]
pub struct BuildRecord {
    /// Position in the history, assigned by the store.
    pub seq: u64,

    /// When the record was appended (UTC).
    pub ts: DateTime<Utc>,

    pub branch: String,

    /// The commit that was built.
    pub hash: Sha,

    pub outcome: BuildOutcome,
}

impl BuildRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }
}

/// A history line whose `succeeded` flag disagrees with its payload.
#[derive(Debug, Error)]
#[error("build record {seq} is malformed: succeeded={succeeded} requires exactly one of `result`/`error`")]
pub struct MalformedRecord {
    seq: u64,
    succeeded: bool,
}

/// Flat on-disk shape of a [`BuildRecord`].
#[derive(Serialize, Deserialize)]
struct RecordRepr {
    seq: u64,
    ts: DateTime<Utc>,
    branch: String,
    hash: Sha,
    succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<BuildSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<BuildFailure>,
}

impl From<BuildRecord> for RecordRepr {
    fn from(record: BuildRecord) -> Self {
        let (succeeded, result, error) = match record.outcome {
            BuildOutcome::Succeeded { result } => (true, Some(result), None),
            BuildOutcome::Failed { error } => (false, None, Some(error)),
        };
        RecordRepr {
            seq: record.seq,
            ts: record.ts,
            branch: record.branch,
            hash: record.hash,
            succeeded,
            result,
            error,
        }
    }
}

impl TryFrom<RecordRepr> for BuildRecord {
    type Error = MalformedRecord;

    fn try_from(repr: RecordRepr) -> Result<Self, Self::Error> {
        let outcome = match (repr.succeeded, repr.result, repr.error) {
            (true, Some(result), None) => BuildOutcome::Succeeded { result },
            (false, None, Some(error)) => BuildOutcome::Failed { error },
            _ => {
                return Err(MalformedRecord {
                    seq: repr.seq,
                    succeeded: repr.succeeded,
                });
            }
        };
        Ok(BuildRecord {
            seq: repr.seq,
            ts: repr.ts,
            branch: repr.branch,
            hash: repr.hash,
            outcome,
        })
    }
}
