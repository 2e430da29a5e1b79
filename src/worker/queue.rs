//! The trigger queue: a FIFO of pending orchestration runs.

use thiserror::Error;
use tokio::sync::mpsc;

use super::message::Trigger;

/// The worker has stopped; the trigger was not queued.
#[derive(Debug, Error)]
#[error("build worker is not running")]
pub struct QueueClosed(pub Trigger);

/// Receiving half, owned by the build worker.
pub type TriggerReceiver = mpsc::UnboundedReceiver<Trigger>;

/// Sending half of the trigger queue. Cheap to clone.
///
/// The queue is unbounded so enqueueing never waits on a running build.
#[derive(Debug, Clone)]
pub struct TriggerQueue {
    tx: mpsc::UnboundedSender<Trigger>,
}

impl TriggerQueue {
    pub fn channel() -> (TriggerQueue, TriggerReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TriggerQueue { tx }, rx)
    }

    pub fn enqueue(&self, trigger: Trigger) -> Result<(), QueueClosed> {
        self.tx.send(trigger).map_err(|e| QueueClosed(e.0))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryId;

    #[tokio::test]
    async fn triggers_arrive_in_enqueue_order() {
        let (queue, mut rx) = TriggerQueue::channel();
        let webhook = |id: &str| Trigger::Webhook {
            delivery_id: Some(DeliveryId::new(id)),
        };

        queue.enqueue(Trigger::Startup).unwrap();
        queue.enqueue(webhook("a")).unwrap();
        queue.clone().enqueue(webhook("b")).unwrap();
        drop(queue);

        assert_eq!(rx.recv().await, Some(Trigger::Startup));
        assert_eq!(rx.recv().await, Some(webhook("a")));
        assert_eq!(rx.recv().await, Some(webhook("b")));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn enqueue_fails_once_receiver_is_gone() {
        let (queue, rx) = TriggerQueue::channel();
        drop(rx);

        assert!(queue.is_closed());
        let err = queue.enqueue(Trigger::Startup).unwrap_err();
        assert_eq!(err.0, Trigger::Startup);
    }
}
