//! Core domain types shared by the tracker, the history store and the orchestrator.

pub mod branch;
pub mod ids;
pub mod record;

pub use branch::{Branch, BranchMap};
pub use ids::{DeliveryId, InvalidSha, Sha};
pub use record::{BuildFailure, BuildOutcome, BuildRecord, BuildSummary, StepSummary};
