//! Shared types used across hubscale crates.

use serde::{Deserialize, Serialize};

use crate::tier::daily_multiplier;

/// Metric name reported by the hub for the daily message count.
pub const TOTAL_MESSAGES_METRIC: &str = "TotalMessages";

/// Snapshot of the managed hub's configuration, fetched fresh each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Short hub name.
    pub name: String,
    /// Tier (SKU) name, e.g. "S1".
    pub tier_name: String,
    /// Units bought within the tier. The controller may omit it.
    pub tier_capacity: Option<u64>,
    /// Full resource document as returned by the controller. Carried
    /// through untouched so an update does not drop unrelated settings.
    #[serde(default)]
    pub document: serde_json::Value,
}

impl ResourceDescriptor {
    /// Messages per day the current tier and capacity allow.
    pub fn ingestion_rate_per_day(&self) -> Option<u64> {
        self.tier_capacity
            .map(|c| daily_multiplier(&self.tier_name).saturating_mul(c))
    }

    /// Copy of this descriptor with a new capacity; the tier is unchanged.
    pub fn with_capacity(&self, capacity: u64) -> Self {
        Self {
            tier_capacity: Some(capacity),
            ..self.clone()
        }
    }
}

/// A named point-in-time usage measurement.
///
/// `current_value` is kept as reported: a missing or negative reading is
/// rejected when the sample is selected, never read as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub metric_name: String,
    pub current_value: Option<i64>,
    pub max_value: Option<u64>,
}

/// Outcome of comparing utilization against the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Utilization is below the threshold.
    NoChange,
    /// Grow the hub to `capacity` units within `tier`.
    ScaleTo { tier: String, capacity: u64 },
}

impl ScaleDecision {
    pub fn should_scale(&self) -> bool {
        matches!(self, ScaleDecision::ScaleTo { .. })
    }
}
