//! The unit of work invoked once per cycle.

use async_trait::async_trait;
use tracing::info;

use hubscale_autoscale::{CycleOutcome, DecisionEngine};

/// Work the orchestrator runs in its `RunningCycle` state.
///
/// Errors end the cycle; the orchestrator logs them and moves on to
/// `Waiting` as it would after a success.
#[async_trait]
pub trait Activity: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl Activity for DecisionEngine {
    fn name(&self) -> &str {
        "HubScaleWorker"
    }

    async fn invoke(&self) -> anyhow::Result<()> {
        match self.run_cycle().await? {
            CycleOutcome::BelowThreshold {
                utilization,
                threshold,
            } => {
                info!(utilization, threshold, "cycle finished, no scaling needed");
            }
            CycleOutcome::Scaled { tier, from, to, elapsed } => {
                info!(
                    %tier,
                    from,
                    to,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "cycle finished, hub scaled"
                );
            }
        }
        Ok(())
    }
}
