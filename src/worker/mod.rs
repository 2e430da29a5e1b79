//! Serialized execution of orchestration runs.
//!
//! Startup and every verified webhook enqueue a [`Trigger`] on the
//! [`TriggerQueue`]. A single [`BuildWorker`] task takes triggers off the
//! queue in order and performs one orchestration run per trigger, so at most
//! one run is in flight at any time.
//!
//! # Module Structure
//!
//! - [`message`]: the trigger type
//! - [`queue`]: the FIFO between the HTTP boundary and the worker
//! - [`worker`]: the event loop

mod message;
mod queue;
#[allow(clippy::module_inception)]
mod worker;

pub use message::Trigger;
pub use queue::{QueueClosed, TriggerQueue, TriggerReceiver};
pub use worker::{BuildWorker, Orchestrate, WorkerStats};
