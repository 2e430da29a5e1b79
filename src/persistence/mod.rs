//! Durable storage for the build robot.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/
//!   history.log   # build history (JSON Lines, append-only)
//! ```

pub mod history;

pub use history::{BuildHistory, HistoryError};

/// File name of the build history inside the state directory.
pub const HISTORY_FILE: &str = "history.log";
