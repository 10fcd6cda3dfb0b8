//! hubscale-core — shared types for the hubscale workspace.
//!
//! - [`tier`]: the static S1/S2/S3 tier table, the scale step function and
//!   the message threshold math.
//! - [`types`]: resource descriptor, utilization samples, scale decisions.
//! - [`config`]: `hubscale.toml` parsing and validation.

pub mod config;
pub mod tier;
pub mod types;

pub use config::{CredentialsConfig, HubScaleConfig, ResourceConfig};
pub use tier::{ScaleError, TierSpec, TIERS, daily_multiplier, message_threshold, step};
pub use types::*;
