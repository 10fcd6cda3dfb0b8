//! Orchestration host — instance status queries and instance creation.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::debug;

use hubscale_state::{InstanceStatus, StartOutcome, StateResult, StateStore};

use crate::clock::Clock;

/// What the launcher needs from the hosting mechanism.
pub trait OrchestrationHost: Send + Sync {
    fn get_status(&self, instance_id: &str) -> StateResult<InstanceStatus>;

    /// Create an instance unless one with `instance_id` is running.
    fn start_new(&self, orchestrator_name: &str, instance_id: &str) -> StateResult<StartOutcome>;
}

/// Host backed by the redb checkpoint store.
///
/// A successful start wakes the orchestrator task waiting on `wake`.
#[derive(Clone)]
pub struct DurableHost {
    store: StateStore,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
}

impl DurableHost {
    pub fn new(store: StateStore, clock: Arc<dyn Clock>, wake: Arc<Notify>) -> Self {
        Self { store, clock, wake }
    }
}

impl OrchestrationHost for DurableHost {
    fn get_status(&self, instance_id: &str) -> StateResult<InstanceStatus> {
        self.store.status(instance_id)
    }

    fn start_new(&self, orchestrator_name: &str, instance_id: &str) -> StateResult<StartOutcome> {
        let outcome = self
            .store
            .start_new(orchestrator_name, instance_id, self.clock.now_ms())?;
        if matches!(outcome, StartOutcome::Started(_)) {
            debug!(%instance_id, "waking orchestrator");
            self.wake.notify_one();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn start_new_notifies_waiting_orchestrator() {
        let store = StateStore::open_in_memory().unwrap();
        let wake = Arc::new(Notify::new());
        let host = DurableHost::new(store.clone(), Arc::new(ManualClock::new(7)), wake.clone());

        assert_eq!(host.get_status("id").unwrap(), InstanceStatus::NotFound);
        host.start_new("Orch", "id").unwrap();
        assert_eq!(host.get_status("id").unwrap(), InstanceStatus::Running);
        assert_eq!(store.get_checkpoint("id").unwrap().unwrap().created_at_ms, 7);

        // The stored permit completes this immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), wake.notified())
            .await
            .unwrap();
    }
}
