//! Cycle error taxonomy.

use thiserror::Error;

use hubscale_core::ScaleError;

pub type CycleResult<T> = Result<T, CycleError>;

/// Reasons a cycle ends without scaling. None of them is fatal to the
/// orchestration loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("unable to create resource client: {0}")]
    CredentialFailure(String),

    #[error("unable to fetch resource descriptor: {0}")]
    DescriptorFetchFailure(String),

    #[error("unable to fetch utilization metrics: {0}")]
    MetricsFetchFailure(String),

    #[error("no utilization sample named {0}")]
    MetricNotFound(String),

    #[error("utilization sample {metric} has no usable value (reported {value:?})")]
    InvalidMetricValue { metric: String, value: Option<i64> },

    #[error("{count} utilization samples named {metric}")]
    AmbiguousMetric { metric: String, count: usize },

    #[error(transparent)]
    CapacityExhausted(#[from] ScaleError),

    #[error("unable to apply new capacity: {0}")]
    ApplyFailure(String),
}
