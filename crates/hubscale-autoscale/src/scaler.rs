//! Decision engine — one fetch/decide/apply pass over the managed hub.
//!
//! The engine keeps no state between cycles. Each call to
//! [`DecisionEngine::run_cycle`] obtains a fresh controller, reads the
//! descriptor and the utilization samples, and issues at most one
//! `create_or_update`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use hubscale_core::{
    HubScaleConfig, ScaleDecision, ScaleError, UtilizationSample, message_threshold, step,
};

use crate::controller::CredentialProvider;
use crate::error::{CycleError, CycleResult};

/// Result of a cycle that ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Utilization below the threshold; nothing was changed.
    BelowThreshold { utilization: u64, threshold: u64 },
    /// The hub was grown by one unit.
    Scaled {
        tier: String,
        from: u64,
        to: u64,
        elapsed: Duration,
    },
}

/// The subset of the configuration the engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub resource_group: String,
    pub resource_name: String,
    pub threshold_percent: u32,
    pub metric_name: String,
}

impl From<&HubScaleConfig> for EngineSettings {
    fn from(config: &HubScaleConfig) -> Self {
        Self {
            resource_group: config.resource.resource_group.clone(),
            resource_name: config.resource.name.clone(),
            threshold_percent: config.threshold_percent,
            metric_name: config.metric_name.clone(),
        }
    }
}

/// Decide what to do for a hub at `tier`/`capacity` with `utilization`.
///
/// Pure: no I/O. `utilization == threshold` scales.
pub fn evaluate(
    tier: &str,
    capacity: u64,
    utilization: u64,
    threshold_percent: u32,
) -> Result<ScaleDecision, ScaleError> {
    let threshold = message_threshold(tier, capacity, threshold_percent);
    if utilization < threshold {
        return Ok(ScaleDecision::NoChange);
    }
    let next = step(tier, capacity)?;
    Ok(ScaleDecision::ScaleTo {
        tier: tier.to_string(),
        capacity: next,
    })
}

/// Runs scaling cycles against one configured hub.
pub struct DecisionEngine {
    settings: EngineSettings,
    credentials: Arc<dyn CredentialProvider>,
}

impl DecisionEngine {
    pub fn new(settings: EngineSettings, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            settings,
            credentials,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Execute one cycle.
    pub async fn run_cycle(&self) -> CycleResult<CycleOutcome> {
        let EngineSettings {
            resource_group,
            resource_name,
            threshold_percent,
            metric_name,
        } = &self.settings;

        let client = self
            .credentials
            .connect()
            .await
            .map_err(|e| CycleError::CredentialFailure(format!("{e:#}")))?;

        let descriptor = client
            .get(resource_group, resource_name)
            .await
            .map_err(|e| CycleError::DescriptorFetchFailure(format!("{e:#}")))?;
        let tier = descriptor.tier_name.as_str();
        let capacity = descriptor.tier_capacity.ok_or_else(|| {
            CycleError::DescriptorFetchFailure(format!(
                "hub {resource_name} reports no capacity for tier {tier}"
            ))
        })?;

        let samples = client
            .get_utilization_metrics(resource_group, resource_name)
            .await
            .map_err(|e| CycleError::MetricsFetchFailure(format!("{e:#}")))?;
        let utilization = select_sample(&samples, metric_name)?;

        let threshold = message_threshold(tier, capacity, *threshold_percent);
        info!(
            hub = %resource_name,
            tier,
            capacity,
            utilization,
            threshold,
            rate_per_day = ?descriptor.ingestion_rate_per_day(),
            "hub utilization"
        );

        let target = match evaluate(tier, capacity, utilization, *threshold_percent)? {
            ScaleDecision::NoChange => {
                debug!(utilization, threshold, "below threshold, nothing to do");
                return Ok(CycleOutcome::BelowThreshold {
                    utilization,
                    threshold,
                });
            }
            ScaleDecision::ScaleTo { capacity, .. } => capacity,
        };

        info!(utilization, threshold, from = capacity, to = target, "over threshold, scaling up");
        let updated = descriptor.with_capacity(target);

        let started = Instant::now();
        client
            .create_or_update(resource_group, resource_name, &updated)
            .await
            .map_err(|e| CycleError::ApplyFailure(format!("{e:#}")))?;
        let elapsed = started.elapsed();

        info!(
            hub = %resource_name,
            tier,
            from = capacity,
            to = target,
            elapsed_ms = elapsed.as_millis() as u64,
            "hub capacity updated"
        );
        Ok(CycleOutcome::Scaled {
            tier: tier.to_string(),
            from: capacity,
            to: target,
            elapsed,
        })
    }
}

/// The single sample named `metric`.
fn select_sample(samples: &[UtilizationSample], metric: &str) -> CycleResult<u64> {
    let mut matching = samples.iter().filter(|s| s.metric_name == metric);
    match (matching.next(), matching.next()) {
        (Some(sample), None) => match sample.current_value {
            Some(value) if value >= 0 => Ok(value as u64),
            value => {
                error!(%metric, ?value, "utilization sample without a usable value");
                Err(CycleError::InvalidMetricValue {
                    metric: metric.to_string(),
                    value,
                })
            }
        },
        (None, _) => Err(CycleError::MetricNotFound(metric.to_string())),
        (Some(_), Some(_)) => {
            let count = samples.iter().filter(|s| s.metric_name == metric).count();
            warn!(%metric, count, "duplicate utilization samples");
            Err(CycleError::AmbiguousMetric {
                metric: metric.to_string(),
                count,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Failures, InMemoryHub};
    use hubscale_core::TOTAL_MESSAGES_METRIC;

    fn settings(percent: u32) -> EngineSettings {
        EngineSettings {
            resource_group: "rg".to_string(),
            resource_name: "hub".to_string(),
            threshold_percent: percent,
            metric_name: TOTAL_MESSAGES_METRIC.to_string(),
        }
    }

    fn engine(hub: &InMemoryHub) -> DecisionEngine {
        DecisionEngine::new(settings(90), Arc::new(hub.clone()))
    }

    fn sample(name: &str, value: i64) -> UtilizationSample {
        UtilizationSample {
            metric_name: name.to_string(),
            current_value: Some(value),
            max_value: Some(400_000),
        }
    }

    // ── evaluate ───────────────────────────────────────────────────

    #[test]
    fn evaluate_below_threshold_is_no_change() {
        assert_eq!(evaluate("S1", 100, 35_999_999, 90), Ok(ScaleDecision::NoChange));
    }

    #[test]
    fn evaluate_over_threshold_scales_one_unit() {
        assert_eq!(
            evaluate("S1", 100, 36_000_001, 90),
            Ok(ScaleDecision::ScaleTo {
                tier: "S1".to_string(),
                capacity: 101
            })
        );
    }

    #[test]
    fn evaluate_at_threshold_scales() {
        assert!(evaluate("S1", 100, 36_000_000, 90).unwrap().should_scale());
    }

    #[test]
    fn evaluate_at_ceiling_is_exhausted() {
        assert!(matches!(
            evaluate("S3", 10, u64::MAX, 90),
            Err(ScaleError::CapacityExhausted { .. })
        ));
    }

    #[test]
    fn evaluate_unknown_tier_is_exhausted() {
        // Unknown tiers have a zero threshold, so any utilization reaches the step.
        assert!(evaluate("F1", 1, 0, 90).is_err());
    }

    // ── run_cycle ──────────────────────────────────────────────────

    #[tokio::test]
    async fn below_threshold_makes_no_mutating_call() {
        let hub = InMemoryHub::new("S1", 100, 35_999_999);
        let outcome = engine(&hub).run_cycle().await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::BelowThreshold {
                utilization: 35_999_999,
                threshold: 36_000_000
            }
        );
        assert!(hub.updates().await.is_empty());
    }

    #[tokio::test]
    async fn over_threshold_applies_capacity_plus_one() {
        let hub = InMemoryHub::new("S1", 100, 36_000_001);
        let outcome = engine(&hub).run_cycle().await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Scaled { from: 100, to: 101, .. }));
        let updates = hub.updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].tier_name, "S1");
        assert_eq!(updates[0].tier_capacity, Some(101));
    }

    #[tokio::test]
    async fn s3_nine_units_scales_to_ten() {
        let hub = InMemoryHub::new("S3", 9, 3_000_000_000);
        let outcome = engine(&hub).run_cycle().await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Scaled { ref tier, from: 9, to: 10, .. } if tier == "S3"));
        assert_eq!(hub.descriptor().await.tier_capacity, Some(10));
    }

    #[tokio::test]
    async fn s3_ten_units_is_exhausted_without_mutation() {
        let hub = InMemoryHub::new("S3", 10, 3_000_000_000);
        let err = engine(&hub).run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::CapacityExhausted(_)));
        assert!(hub.updates().await.is_empty());
    }

    #[tokio::test]
    async fn credential_failure_aborts() {
        let hub = InMemoryHub::new("S1", 1, u64::MAX);
        hub.set_failures(Failures {
            connect: true,
            ..Failures::default()
        })
        .await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::CredentialFailure(_)));
        assert!(hub.updates().await.is_empty());
    }

    #[tokio::test]
    async fn descriptor_failure_aborts() {
        let hub = InMemoryHub::new("S1", 1, u64::MAX);
        hub.set_failures(Failures {
            get: true,
            ..Failures::default()
        })
        .await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::DescriptorFetchFailure(_)));
    }

    #[tokio::test]
    async fn missing_capacity_aborts() {
        let hub = InMemoryHub::with_descriptor(
            hubscale_core::ResourceDescriptor {
                name: "hub".to_string(),
                tier_name: "S1".to_string(),
                tier_capacity: None,
                document: serde_json::Value::Null,
            },
            vec![sample(TOTAL_MESSAGES_METRIC, 1)],
        );

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::DescriptorFetchFailure(_)));
    }

    #[tokio::test]
    async fn metrics_failure_aborts() {
        let hub = InMemoryHub::new("S1", 1, u64::MAX);
        hub.set_failures(Failures {
            metrics: true,
            ..Failures::default()
        })
        .await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::MetricsFetchFailure(_)));
    }

    #[tokio::test]
    async fn missing_metric_is_an_error_not_zero() {
        let hub = InMemoryHub::new("S1", 1, 0);
        hub.set_samples(vec![sample("TotalDeviceCount", 10)]).await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::MetricNotFound(ref m) if m == "TotalMessages"));
        assert!(hub.updates().await.is_empty());
    }

    #[tokio::test]
    async fn sample_without_value_is_an_error_not_zero() {
        let hub = InMemoryHub::new("S1", 1, 0);
        hub.set_samples(vec![UtilizationSample {
            metric_name: TOTAL_MESSAGES_METRIC.to_string(),
            current_value: None,
            max_value: Some(400_000),
        }])
        .await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::InvalidMetricValue { value: None, .. }));
        assert!(hub.updates().await.is_empty());
    }

    #[tokio::test]
    async fn negative_sample_is_rejected() {
        let hub = InMemoryHub::new("S1", 1, 0);
        hub.set_samples(vec![sample(TOTAL_MESSAGES_METRIC, -1)]).await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::InvalidMetricValue { value: Some(-1), .. }));
        assert!(hub.updates().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_metric_is_ambiguous() {
        let hub = InMemoryHub::new("S1", 1, 0);
        hub.set_samples(vec![
            sample(TOTAL_MESSAGES_METRIC, 10),
            sample("TotalDeviceCount", 3),
            sample(TOTAL_MESSAGES_METRIC, 20),
        ])
        .await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::AmbiguousMetric { count: 2, .. }));
    }

    #[tokio::test]
    async fn target_metric_is_picked_among_others() {
        let hub = InMemoryHub::new("S2", 1, 0);
        hub.set_samples(vec![
            sample("TotalDeviceCount", 999_999_999),
            sample(TOTAL_MESSAGES_METRIC, 10),
        ])
        .await;

        let outcome = engine(&hub).run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::BelowThreshold { utilization: 10, .. }));
    }

    #[tokio::test]
    async fn apply_failure_is_reported() {
        let hub = InMemoryHub::new("S2", 3, u64::MAX);
        hub.set_failures(Failures {
            apply: true,
            ..Failures::default()
        })
        .await;

        let err = engine(&hub).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::ApplyFailure(_)));
        // One call was attempted; the hub itself is unchanged.
        assert_eq!(hub.updates().await.len(), 1);
        assert_eq!(hub.descriptor().await.tier_capacity, Some(3));
    }

    #[tokio::test]
    async fn apply_keeps_document_intact() {
        let hub = InMemoryHub::with_descriptor(
            hubscale_core::ResourceDescriptor {
                name: "hub".to_string(),
                tier_name: "S1".to_string(),
                tier_capacity: Some(2),
                document: serde_json::json!({"location": "northeurope", "etag": "AAA"}),
            },
            vec![sample(TOTAL_MESSAGES_METRIC, 1_000_000)],
        );

        engine(&hub).run_cycle().await.unwrap();
        let applied = &hub.updates().await[0];
        assert_eq!(applied.document["location"], "northeurope");
        assert_eq!(applied.tier_capacity, Some(3));
    }

    #[test]
    fn settings_from_config() {
        let config = HubScaleConfig::from_toml_str(
            r#"
threshold_percent = 75
[resource]
resource_group = "rg-a"
name = "hub-a"
[credentials]
application_id = "a"
tenant_id = "t"
subscription_id = "s"
"#,
        )
        .unwrap();
        let s = EngineSettings::from(&config);
        assert_eq!(s.resource_group, "rg-a");
        assert_eq!(s.resource_name, "hub-a");
        assert_eq!(s.threshold_percent, 75);
        assert_eq!(s.metric_name, "TotalMessages");
    }
}
