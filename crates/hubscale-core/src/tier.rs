//! Tier table, scale step and threshold math.
//!
//! Each tier sells capacity in whole units. A unit allows a fixed number of
//! messages per day, and a tier caps the number of units that can be bought
//! without an out-of-band support request.
//!
//! ```text
//! threshold = floor(multiplier(tier) * capacity * percent / 100)
//! step(tier, c) = c + 1        if c <= max(tier)
//!               = exhausted    otherwise, or when the tier is unknown
//! ```

use thiserror::Error;

/// Static description of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSpec {
    pub name: &'static str,
    /// Messages per day allowed by a single capacity unit.
    pub daily_messages_per_unit: u64,
    /// Highest capacity that may still be incremented by one unit.
    pub max_capacity_units: u64,
}

/// Known tiers. Not runtime-configurable.
pub const TIERS: [TierSpec; 3] = [
    TierSpec {
        name: "S1",
        daily_messages_per_unit: 400_000,
        max_capacity_units: 199,
    },
    TierSpec {
        name: "S2",
        daily_messages_per_unit: 6_000_000,
        max_capacity_units: 199,
    },
    TierSpec {
        name: "S3",
        daily_messages_per_unit: 300_000_000,
        max_capacity_units: 9,
    },
];

impl TierSpec {
    /// Look up a tier by name (exact, case-sensitive match).
    pub fn lookup(name: &str) -> Option<&'static TierSpec> {
        TIERS.iter().find(|t| t.name == name)
    }
}

/// Failure of the scale step function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    #[error("capacity exhausted for tier {tier} at {capacity} units")]
    CapacityExhausted { tier: String, capacity: u64 },
}

/// Next capacity for `tier`, one unit above `capacity`.
///
/// Never changes tier and never exceeds the tier ceiling. Unknown tiers
/// are reported as exhausted.
pub fn step(tier: &str, capacity: u64) -> Result<u64, ScaleError> {
    match TierSpec::lookup(tier) {
        Some(spec) if capacity <= spec.max_capacity_units => Ok(capacity + 1),
        _ => Err(ScaleError::CapacityExhausted {
            tier: tier.to_string(),
            capacity,
        }),
    }
}

/// Daily message allowance per unit for `tier`; 0 for unknown tiers.
pub fn daily_multiplier(tier: &str) -> u64 {
    TierSpec::lookup(tier)
        .map(|t| t.daily_messages_per_unit)
        .unwrap_or(0)
}

/// Message count at which a hub of `tier` x `capacity` should grow.
///
/// Integer math in `u64`. The largest realistic product (S3, 10 units,
/// 100%) is about 3e11, far below `u64::MAX`; the multiplications saturate
/// rather than wrap for absurd inputs.
pub fn message_threshold(tier: &str, capacity: u64, percent: u32) -> u64 {
    daily_multiplier(tier)
        .saturating_mul(capacity)
        .saturating_mul(u64::from(percent))
        / 100
}
