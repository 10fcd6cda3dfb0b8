//! Launcher — makes sure the singleton orchestration exists.
//!
//! Invoked on every trigger tick. Holds no state of its own; failures are
//! returned to the caller and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use hubscale_state::{InstanceStatus, StartOutcome, StateResult};

use crate::host::OrchestrationHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started,
    AlreadyRunning,
}

pub struct Launcher {
    host: Arc<dyn OrchestrationHost>,
    orchestrator_name: String,
    instance_id: String,
}

impl Launcher {
    pub fn new(host: Arc<dyn OrchestrationHost>, orchestrator_name: &str, instance_id: &str) -> Self {
        Self {
            host,
            orchestrator_name: orchestrator_name.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    /// Start the orchestration unless it is already running.
    ///
    /// Safe to call redundantly or concurrently: the host's `start_new`
    /// re-checks inside its own transaction.
    pub fn ensure_running(&self) -> StateResult<LaunchOutcome> {
        if self.host.get_status(&self.instance_id)? == InstanceStatus::Running {
            info!(instance_id = %self.instance_id, "instance already running, nothing to do");
            return Ok(LaunchOutcome::AlreadyRunning);
        }

        info!(instance_id = %self.instance_id, "instance not running, starting new instance");
        match self.host.start_new(&self.orchestrator_name, &self.instance_id)? {
            StartOutcome::Started(_) => Ok(LaunchOutcome::Started),
            StartOutcome::AlreadyRunning(_) => Ok(LaunchOutcome::AlreadyRunning),
        }
    }

    /// Call `ensure_running` on every tick of `interval`, starting now.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "launcher started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.ensure_running() {
                        error!(error = %e, "launcher tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("launcher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hubscale_state::{Checkpoint, StateError, StateStore};

    /// Host over a real store that counts `start_new` calls.
    struct CountingHost {
        store: StateStore,
        starts: AtomicUsize,
        fail_status: Mutex<bool>,
    }

    impl CountingHost {
        fn new() -> Self {
            Self {
                store: StateStore::open_in_memory().unwrap(),
                starts: AtomicUsize::new(0),
                fail_status: Mutex::new(false),
            }
        }
    }

    impl OrchestrationHost for CountingHost {
        fn get_status(&self, instance_id: &str) -> StateResult<InstanceStatus> {
            if *self.fail_status.lock().unwrap() {
                return Err(StateError::Read("simulated".to_string()));
            }
            self.store.status(instance_id)
        }

        fn start_new(&self, name: &str, instance_id: &str) -> StateResult<StartOutcome> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.store.start_new(name, instance_id, 1_000)
        }
    }

    #[test]
    fn starts_when_absent() {
        let host = Arc::new(CountingHost::new());
        let launcher = Launcher::new(host.clone(), "Orch", "Orch_1");

        assert_eq!(launcher.ensure_running().unwrap(), LaunchOutcome::Started);
        assert_eq!(host.starts.load(Ordering::SeqCst), 1);
        assert_eq!(host.store.status("Orch_1").unwrap(), InstanceStatus::Running);
    }

    #[test]
    fn two_calls_in_succession_start_once() {
        let host = Arc::new(CountingHost::new());
        let launcher = Launcher::new(host.clone(), "Orch", "Orch_1");

        assert_eq!(launcher.ensure_running().unwrap(), LaunchOutcome::Started);
        assert_eq!(launcher.ensure_running().unwrap(), LaunchOutcome::AlreadyRunning);
        assert_eq!(host.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_while_running() {
        let host = Arc::new(CountingHost::new());
        host.store
            .put_checkpoint(&Checkpoint::new("Orch", "Orch_1", 5))
            .unwrap();
        let launcher = Launcher::new(host.clone(), "Orch", "Orch_1");

        assert_eq!(launcher.ensure_running().unwrap(), LaunchOutcome::AlreadyRunning);
        assert_eq!(host.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restarts_completed_instance() {
        let host = Arc::new(CountingHost::new());
        let launcher = Launcher::new(host.clone(), "Orch", "Orch_1");
        launcher.ensure_running().unwrap();
        host.store.terminate("Orch_1", 2_000).unwrap();

        assert_eq!(launcher.ensure_running().unwrap(), LaunchOutcome::Started);
        assert_eq!(host.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_launchers_create_one_instance() {
        let host = Arc::new(CountingHost::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let launcher = Launcher::new(host.clone(), "Orch", "Orch_1");
                std::thread::spawn(move || launcher.ensure_running().unwrap())
            })
            .collect();
        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == LaunchOutcome::Started)
            .count();
        assert_eq!(started, 1);
        assert_eq!(host.store.list_checkpoints().unwrap().len(), 1);
    }

    #[test]
    fn status_failure_is_surfaced() {
        let host = Arc::new(CountingHost::new());
        *host.fail_status.lock().unwrap() = true;
        let launcher = Launcher::new(host.clone(), "Orch", "Orch_1");

        assert!(launcher.ensure_running().is_err());
        assert_eq!(host.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_ticks_immediately_and_stops_on_shutdown() {
        let host = Arc::new(CountingHost::new());
        let launcher = Launcher::new(host.clone(), "Orch", "Orch_1");
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            launcher.run(Duration::from_secs(3600), rx).await;
        });
        // The first tick fires right away.
        for _ in 0..100 {
            if host.store.status("Orch_1").unwrap() == InstanceStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(host.store.status("Orch_1").unwrap(), InstanceStatus::Running);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
