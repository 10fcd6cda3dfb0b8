//! Domain types for the hubscale state store.
//!
//! All types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Identifier of an orchestration instance.
pub type InstanceId = String;

/// Lifecycle status of an orchestration instance as reported to callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    NotFound,
    Completed,
}

/// Where a running orchestration will resume after a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    /// Fresh execution; the cycle has not been entered yet.
    Started,
    /// The cycle was entered. Resuming here runs the cycle again.
    RunningCycle,
    /// The cycle finished; sleep until `next_wake_ms` (Unix millis).
    Waiting { next_wake_ms: u64 },
}

/// Persisted checkpoint of the singleton orchestration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub instance_id: InstanceId,
    pub orchestrator_name: String,
    /// Only `Running` or `Completed` are ever stored.
    pub status: InstanceStatus,
    /// Starts at 1 and increments on every continue-as-new.
    pub execution: u64,
    pub phase: Phase,
    /// Unix millis when the instance was first started.
    pub created_at_ms: u64,
    /// Unix millis of the last phase change.
    pub updated_at_ms: u64,
}

impl Checkpoint {
    /// A fresh first execution.
    pub fn new(orchestrator_name: &str, instance_id: &str, now_ms: u64) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            orchestrator_name: orchestrator_name.to_string(),
            status: InstanceStatus::Running,
            execution: 1,
            phase: Phase::Started,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn table_key(&self) -> &str {
        &self.instance_id
    }

    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// The wake time if the instance is waiting on its timer.
    pub fn next_wake_ms(&self) -> Option<u64> {
        match self.phase {
            Phase::Waiting { next_wake_ms } => Some(next_wake_ms),
            _ => None,
        }
    }
}
