//! Messages sent to the build worker.

use crate::orchestrator::RunKind;
use crate::types::DeliveryId;

/// A request for one orchestration run.
///
/// Every trigger produces exactly one run; triggers are never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The scan at process start.
    Startup,

    /// A verified webhook delivery.
    Webhook {
        /// The `X-GitHub-Delivery` header, when the sender provided one.
        delivery_id: Option<DeliveryId>,
    },
}

impl Trigger {
    pub fn run_kind(&self) -> RunKind {
        match self {
            Trigger::Startup => RunKind::Startup,
            Trigger::Webhook { .. } => RunKind::Webhook,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_startup_is_a_startup_run() {
        assert_eq!(Trigger::Startup.run_kind(), RunKind::Startup);
        assert_eq!(
            Trigger::Webhook { delivery_id: None }.run_kind(),
            RunKind::Webhook
        );
    }
}
