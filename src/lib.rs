//! Build Robot - tracks a git repository and runs a build pipeline for every
//! branch that changes.
//!
//! Runs are triggered at startup and by signed webhooks. They are serialized
//! through a single queue, and every build attempt is recorded in an
//! append-only history.

pub mod config;
pub mod git;
pub mod orchestrator;
pub mod persistence;
pub mod pipeline;
pub mod server;
pub mod types;
pub mod webhooks;
pub mod worker;

#[cfg(test)]
pub mod test_utils;
