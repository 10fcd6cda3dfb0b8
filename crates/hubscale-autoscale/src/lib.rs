//! hubscale-autoscale — the per-cycle scaling decision.
//!
//! Fetches the hub descriptor and its utilization through a
//! [`ResourceController`], compares the message count against the tier
//! threshold, and grows the hub by one capacity unit when it is crossed.
//!
//! # Scaling Algorithm
//!
//! ```text
//! threshold = floor(multiplier(tier) * capacity * threshold_percent / 100)
//!
//! if utilization < threshold:
//!     NoChange
//! else:
//!     ScaleTo(tier, step(tier, capacity))   // capacity + 1, same tier
//!     or CapacityExhausted at the tier ceiling
//! ```
//!
//! Every failure ends the cycle without touching the hub. There is no
//! in-cycle retry; the next scheduled cycle re-evaluates from scratch.

pub mod controller;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod scaler;

pub use controller::{CredentialProvider, ResourceController};
pub use error::{CycleError, CycleResult};
#[cfg(any(test, feature = "testing"))]
pub use memory::{Failures, InMemoryHub};
pub use scaler::{CycleOutcome, DecisionEngine, EngineSettings, evaluate};
