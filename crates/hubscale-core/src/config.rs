//! hubscale.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::types::TOTAL_MESSAGES_METRIC;

/// Environment variable consulted when `credentials.secret` is absent.
pub const SECRET_ENV_VAR: &str = "HUBSCALE_CLIENT_SECRET";

/// Immutable process-wide configuration, built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubScaleConfig {
    /// Minutes between the end of one cycle and the start of the next.
    #[serde(default = "default_job_frequency_minutes")]
    pub job_frequency_minutes: f64,
    /// Percentage of the daily allowance at which the hub grows.
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: u32,
    /// Seconds between launcher ticks.
    #[serde(default = "default_launcher_interval_secs")]
    pub launcher_interval_secs: u64,
    /// Utilization metric compared against the threshold.
    #[serde(default = "default_metric_name")]
    pub metric_name: String,
    pub resource: ResourceConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    pub resource_group: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    pub application_id: String,
    pub tenant_id: String,
    pub subscription_id: String,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
}

fn default_job_frequency_minutes() -> f64 {
    5.0
}

fn default_threshold_percent() -> u32 {
    90
}

fn default_launcher_interval_secs() -> u64 {
    3600
}

fn default_metric_name() -> String {
    TOTAL_MESSAGES_METRIC.to_string()
}

/// Longest interval whose millisecond count fits a `u64` wake time.
const MAX_INTERVAL: Duration = Duration::from_millis(u64::MAX);

fn interval_from_minutes(minutes: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(minutes * 60.0)
        .ok()
        .filter(|d| *d <= MAX_INTERVAL)
}

impl HubScaleConfig {
    /// Read, parse and validate a config file.
    ///
    /// A missing `credentials.secret` is filled from `HUBSCALE_CLIENT_SECRET`.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        if config.credentials.secret.is_none() {
            config.credentials.secret = std::env::var(SECRET_ENV_VAR).ok();
        }
        Ok(config)
    }

    /// Parse and validate TOML text. No environment lookup.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: HubScaleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.job_frequency_minutes.is_finite() || self.job_frequency_minutes <= 0.0 {
            bail!(
                "job_frequency_minutes must be a positive number, got {}",
                self.job_frequency_minutes
            );
        }
        if interval_from_minutes(self.job_frequency_minutes).is_none() {
            bail!(
                "job_frequency_minutes is too large, got {}",
                self.job_frequency_minutes
            );
        }
        // Above 100 is allowed: the hub then grows only past its allowance.
        if self.threshold_percent == 0 {
            bail!("threshold_percent must be at least 1");
        }
        if self.launcher_interval_secs == 0 {
            bail!("launcher_interval_secs must be greater than zero");
        }
        for (field, value) in [
            ("metric_name", &self.metric_name),
            ("resource.resource_group", &self.resource.resource_group),
            ("resource.name", &self.resource.name),
            ("credentials.application_id", &self.credentials.application_id),
            ("credentials.tenant_id", &self.credentials.tenant_id),
            ("credentials.subscription_id", &self.credentials.subscription_id),
        ] {
            if value.trim().is_empty() {
                bail!("{field} must not be empty");
            }
        }
        Ok(())
    }

    /// The fixed cycle interval. Saturates for values `validate` rejects.
    pub fn job_frequency(&self) -> Duration {
        interval_from_minutes(self.job_frequency_minutes).unwrap_or(MAX_INTERVAL)
    }

    pub fn launcher_interval(&self) -> Duration {
        Duration::from_secs(self.launcher_interval_secs)
    }
}
