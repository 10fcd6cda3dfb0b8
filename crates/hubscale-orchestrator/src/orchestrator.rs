//! Orchestrator — the perpetual, checkpointed scaling loop.
//!
//! Drives the checkpoint of one fixed instance id through
//! `Started → RunningCycle → Waiting → Rearmed`. Each call to
//! [`Orchestrator::advance`] performs one transition and commits it; the
//! [`Orchestrator::run`] loop calls `advance` and does the waiting in
//! between (for the durable timer, or for the launcher to start an
//! instance).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use hubscale_state::{Checkpoint, Phase, StateError, StateResult, StateStore};

use crate::activity::Activity;
use crate::clock::Clock;

/// Pause after a checkpoint store failure before trying again.
const STORE_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// What a single [`Orchestrator::advance`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// No running instance; wait for the launcher.
    Idle,
    /// The cycle ran and the timer was armed.
    CycleCompleted { execution: u64, next_wake_ms: u64 },
    /// The timer has not fired yet.
    WaitUntil { next_wake_ms: u64 },
    /// The timer fired; a fresh execution replaced the old one.
    Rearmed { execution: u64 },
    /// Another writer moved the checkpoint on; reload and continue.
    Superseded,
}

pub struct Orchestrator {
    store: StateStore,
    activity: Arc<dyn Activity>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    instance_id: String,
    wake: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        activity: Arc<dyn Activity>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        instance_id: &str,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            activity,
            clock,
            interval,
            instance_id: instance_id.to_string(),
            wake,
        }
    }

    /// Perform the next transition for the persisted checkpoint.
    pub async fn advance(&self) -> StateResult<Step> {
        let cp = match self.store.get_checkpoint(&self.instance_id)? {
            Some(cp) if cp.is_running() => cp,
            _ => return Ok(Step::Idle),
        };

        let step = match cp.phase {
            Phase::Started | Phase::RunningCycle => self.run_cycle(&cp).await,
            Phase::Waiting { next_wake_ms } => {
                if self.clock.now_ms() < next_wake_ms {
                    return Ok(Step::WaitUntil { next_wake_ms });
                }
                self.rearm(&cp)
            }
        };

        match step {
            Err(StateError::Conflict { .. }) => Ok(Step::Superseded),
            Err(StateError::NotFound(_) | StateError::NotRunning(_)) => Ok(Step::Idle),
            other => other,
        }
    }

    /// `RunningCycle`: invoke the activity once, then arm the timer.
    async fn run_cycle(&self, cp: &Checkpoint) -> StateResult<Step> {
        if cp.phase == Phase::RunningCycle {
            warn!(
                instance_id = %cp.instance_id,
                execution = cp.execution,
                "resuming an interrupted cycle, running it again"
            );
        }
        self.store.transition(
            &cp.instance_id,
            cp.execution,
            Phase::RunningCycle,
            self.clock.now_ms(),
        )?;

        info!(
            instance_id = %cp.instance_id,
            execution = cp.execution,
            activity = self.activity.name(),
            "orchestrator cycle started"
        );
        if let Err(e) = self.activity.invoke().await {
            error!(
                instance_id = %cp.instance_id,
                activity = self.activity.name(),
                error = %format!("{e:#}"),
                "cycle failed"
            );
        }

        let now = self.clock.now_ms();
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        let next_wake_ms = now.saturating_add(interval_ms);
        self.store.transition(
            &cp.instance_id,
            cp.execution,
            Phase::Waiting { next_wake_ms },
            now,
        )?;
        info!(
            instance_id = %cp.instance_id,
            next_wake_ms,
            interval_secs = self.interval.as_secs_f64(),
            "orchestrator done, next instance armed"
        );
        Ok(Step::CycleCompleted {
            execution: cp.execution,
            next_wake_ms,
        })
    }

    /// `Rearmed`: replace the execution with a fresh one.
    fn rearm(&self, cp: &Checkpoint) -> StateResult<Step> {
        let fresh = self
            .store
            .continue_as_new(&cp.instance_id, cp.execution, self.clock.now_ms())?;
        debug!(instance_id = %fresh.instance_id, execution = fresh.execution, "continued as new");
        Ok(Step::Rearmed {
            execution: fresh.execution,
        })
    }

    /// Drive the checkpoint until `shutdown` fires.
    ///
    /// Shutdown interrupts a wait without touching the checkpoint, so the
    /// next process picks up exactly where this one stopped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(instance_id = %self.instance_id, "orchestrator task started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let step = self.advance().await;
            match step {
                Ok(Step::Idle) => {
                    debug!("no running instance, waiting for launcher");
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Ok(Step::WaitUntil { next_wake_ms }) => {
                    debug!(next_wake_ms, "waiting on durable timer");
                    tokio::select! {
                        _ = self.clock.sleep_until(next_wake_ms) => {}
                        // Only a leftover launcher permit lands here; `advance`
                        // re-reads the checkpoint and waits again if not due.
                        _ = self.wake.notified() => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Ok(_) => tokio::task::yield_now().await,
                Err(e) => {
                    error!(error = %e, "checkpoint store failure, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(STORE_RETRY_BACKOFF) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        info!(instance_id = %self.instance_id, "orchestrator task stopped");
    }
}
