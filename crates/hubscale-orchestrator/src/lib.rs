//! hubscale-orchestrator — the perpetual singleton scaling loop.
//!
//! # States
//!
//! ```text
//! Launcher ──start_new──▶ Started ──▶ RunningCycle ──▶ Waiting{next_wake}
//!                            ▲                               │
//!                            └──── Rearmed (execution + 1) ◀─┘
//! ```
//!
//! Every edge is a committed write to the checkpoint in `hubscale-state`
//! before the orchestrator acts on it, so a restarted process resumes from
//! the last committed state: a `Waiting` instance keeps its persisted wake
//! time, and a `RunningCycle` instance runs its cycle again.
//!
//! The [`Launcher`] is the only component that creates instances; it does
//! so through an [`OrchestrationHost`], whose `start_new` is a no-op while
//! an instance with the fixed id is running.

pub mod activity;
pub mod clock;
pub mod host;
pub mod launcher;
pub mod orchestrator;

pub use activity::Activity;
pub use clock::{Clock, ManualClock, SystemClock};
pub use host::{DurableHost, OrchestrationHost};
pub use launcher::{LaunchOutcome, Launcher};
pub use orchestrator::{Orchestrator, Step};

/// Name under which the scaling orchestrator is registered.
pub const ORCHESTRATOR_NAME: &str = "HubScaleOrchestrator";

/// The fixed singleton instance id. Never generated per run.
pub const INSTANCE_ID: &str = "HubScaleOrchestrator_1";
