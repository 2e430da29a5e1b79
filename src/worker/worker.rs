//! The build worker: runs queued triggers one at a time.
//!
//! Each trigger is run to completion before the next one is taken off the
//! queue, so runs never interleave and each observes the repository as it
//! is when its own fetch happens. A failed run is logged and the worker
//! moves on; the next trigger starts fresh.
//!
//! # Shutdown
//!
//! The loop stops when the cancellation token fires (a run in progress is
//! finished first, queued triggers are dropped) or when every
//! [`TriggerQueue`](super::TriggerQueue) handle is gone and the queue is
//! drained.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::git::CommandRunner;
use crate::orchestrator::{BuildOrchestrator, RunError, RunKind, RunReport};
use crate::pipeline::BuildPipeline;

use super::message::Trigger;
use super::queue::TriggerReceiver;

/// Performs one orchestration run. Implemented by [`BuildOrchestrator`].
pub trait Orchestrate: Send + Sync + 'static {
    fn run(&self, kind: RunKind) -> impl Future<Output = Result<RunReport, RunError>> + Send;
}

impl<P: BuildPipeline, R: CommandRunner + 'static> Orchestrate for BuildOrchestrator<P, R> {
    fn run(&self, kind: RunKind) -> impl Future<Output = Result<RunReport, RunError>> + Send {
        BuildOrchestrator::run(self, kind)
    }
}

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Runs that finished (whatever their builds' outcomes).
    pub completed: u64,
    /// Runs that ended early with a [`RunError`].
    pub aborted: u64,
}

pub struct BuildWorker<O> {
    orchestrator: O,
}

impl<O: Orchestrate> BuildWorker<O> {
    pub fn new(orchestrator: O) -> Self {
        BuildWorker { orchestrator }
    }

    /// Runs the worker event loop until shutdown.
    #[instrument(skip_all)]
    pub async fn run(self, mut rx: TriggerReceiver, shutdown: CancellationToken) -> WorkerStats {
        info!("Build worker started");
        let mut stats = WorkerStats::default();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping worker");
                    break;
                }

                trigger = rx.recv() => {
                    let Some(trigger) = trigger else {
                        info!("Trigger queue closed");
                        break;
                    };
                    self.handle(trigger, &mut stats).await;
                }
            }
        }

        info!(
            completed = stats.completed,
            aborted = stats.aborted,
            "Build worker stopped"
        );
        stats
    }

    async fn handle(&self, trigger: Trigger, stats: &mut WorkerStats) {
        match &trigger {
            Trigger::Startup => debug!("Starting startup run"),
            Trigger::Webhook { delivery_id } => debug!(
                delivery_id = delivery_id.as_ref().map_or("-", |id| id.as_str()),
                "Starting webhook run"
            ),
        }

        match self.orchestrator.run(trigger.run_kind()).await {
            Ok(_) => stats.completed += 1,
            Err(e) => {
                error!(error = %e, "Run aborted");
                stats.aborted += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::TrackerError;
    use crate::types::DeliveryId;
    use crate::worker::TriggerQueue;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Logs the start and end of every run; each run takes a little while.
    #[derive(Clone, Default)]
    struct SlowOrchestrator {
        log: Arc<Mutex<Vec<String>>>,
        fail_first: bool,
    }

    impl Orchestrate for SlowOrchestrator {
        async fn run(&self, kind: RunKind) -> Result<RunReport, RunError> {
            let n = {
                let mut log = self.log.lock().unwrap();
                let n = log.len() / 2;
                log.push(format!("start {n} {kind:?}"));
                n
            };
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.log.lock().unwrap().push(format!("end {n}"));

            if self.fail_first && n == 0 {
                return Err(TrackerError::BranchNotFound("master".to_string()).into());
            }
            Ok(RunReport::default())
        }
    }

    fn webhook(id: &str) -> Trigger {
        Trigger::Webhook {
            delivery_id: Some(DeliveryId::new(id)),
        }
    }

    #[tokio::test]
    async fn runs_never_interleave() {
        let orchestrator = SlowOrchestrator::default();
        let log = Arc::clone(&orchestrator.log);
        let (queue, rx) = TriggerQueue::channel();

        let worker = tokio::spawn(BuildWorker::new(orchestrator).run(rx, CancellationToken::new()));
        queue.enqueue(Trigger::Startup).unwrap();
        queue.enqueue(webhook("a")).unwrap();
        queue.enqueue(webhook("b")).unwrap();
        drop(queue);

        let stats = worker.await.unwrap();
        assert_eq!(stats.completed, 3);

        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "start 0 Startup",
                "end 0",
                "start 1 Webhook",
                "end 1",
                "start 2 Webhook",
                "end 2",
            ]
        );
    }

    #[tokio::test]
    async fn aborted_run_does_not_stop_the_worker() {
        let orchestrator = SlowOrchestrator {
            fail_first: true,
            ..Default::default()
        };
        let (queue, rx) = TriggerQueue::channel();
        queue.enqueue(Trigger::Startup).unwrap();
        queue.enqueue(webhook("a")).unwrap();
        drop(queue);

        let stats = BuildWorker::new(orchestrator)
            .run(rx, CancellationToken::new())
            .await;

        assert_eq!(
            stats,
            WorkerStats {
                completed: 1,
                aborted: 1
            }
        );
    }

    #[tokio::test]
    async fn cancellation_stops_before_queued_runs() {
        let orchestrator = SlowOrchestrator::default();
        let log = Arc::clone(&orchestrator.log);
        let (queue, rx) = TriggerQueue::channel();
        queue.enqueue(Trigger::Startup).unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let stats = BuildWorker::new(orchestrator).run(rx, shutdown).await;

        assert_eq!(stats, WorkerStats::default());
        assert!(log.lock().unwrap().is_empty());
        assert!(queue.is_closed());
    }
}
