//! In-memory hub — a `ResourceController` that keeps one descriptor in
//! process memory and records every applied update.
//!
//! Compiled for this crate's tests and, with the `testing` feature, for
//! tests in dependent crates.

use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use hubscale_core::{ResourceDescriptor, TOTAL_MESSAGES_METRIC, UtilizationSample};

use crate::controller::{CredentialProvider, ResourceController};

/// Which calls should fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub connect: bool,
    pub get: bool,
    pub metrics: bool,
    pub apply: bool,
}

struct HubState {
    descriptor: ResourceDescriptor,
    samples: Vec<UtilizationSample>,
    updates: Vec<ResourceDescriptor>,
    failures: Failures,
}

/// Shared handle; clones see the same hub.
#[derive(Clone)]
pub struct InMemoryHub {
    inner: Arc<Mutex<HubState>>,
}

impl InMemoryHub {
    /// A hub at `tier`/`capacity` reporting `utilization` total messages.
    pub fn new(tier: &str, capacity: u64, utilization: u64) -> Self {
        Self::with_descriptor(
            ResourceDescriptor {
                name: "in-memory".to_string(),
                tier_name: tier.to_string(),
                tier_capacity: Some(capacity),
                document: serde_json::Value::Null,
            },
            vec![total_messages(utilization)],
        )
    }

    pub fn with_descriptor(descriptor: ResourceDescriptor, samples: Vec<UtilizationSample>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubState {
                descriptor,
                samples,
                updates: Vec::new(),
                failures: Failures::default(),
            })),
        }
    }

    pub async fn set_failures(&self, failures: Failures) {
        self.inner.lock().await.failures = failures;
    }

    pub async fn set_utilization(&self, utilization: u64) {
        self.inner.lock().await.samples = vec![total_messages(utilization)];
    }

    pub async fn set_samples(&self, samples: Vec<UtilizationSample>) {
        self.inner.lock().await.samples = samples;
    }

    pub async fn descriptor(&self) -> ResourceDescriptor {
        self.inner.lock().await.descriptor.clone()
    }

    /// Every descriptor passed to `create_or_update`, oldest first.
    pub async fn updates(&self) -> Vec<ResourceDescriptor> {
        self.inner.lock().await.updates.clone()
    }
}

fn total_messages(value: u64) -> UtilizationSample {
    UtilizationSample {
        metric_name: TOTAL_MESSAGES_METRIC.to_string(),
        current_value: Some(i64::try_from(value).unwrap_or(i64::MAX)),
        max_value: None,
    }
}

#[async_trait]
impl ResourceController for InMemoryHub {
    async fn get(&self, _resource_group: &str, _resource_name: &str) -> anyhow::Result<ResourceDescriptor> {
        let state = self.inner.lock().await;
        if state.failures.get {
            bail!("simulated descriptor failure");
        }
        Ok(state.descriptor.clone())
    }

    async fn get_utilization_metrics(
        &self,
        _resource_group: &str,
        _resource_name: &str,
    ) -> anyhow::Result<Vec<UtilizationSample>> {
        let state = self.inner.lock().await;
        if state.failures.metrics {
            bail!("simulated metrics failure");
        }
        Ok(state.samples.clone())
    }

    async fn create_or_update(
        &self,
        _resource_group: &str,
        _resource_name: &str,
        descriptor: &ResourceDescriptor,
    ) -> anyhow::Result<()> {
        let mut state = self.inner.lock().await;
        state.updates.push(descriptor.clone());
        if state.failures.apply {
            return Err(anyhow!("simulated apply failure"));
        }
        state.descriptor = descriptor.clone();
        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for InMemoryHub {
    async fn connect(&self) -> anyhow::Result<Arc<dyn ResourceController>> {
        if self.inner.lock().await.failures.connect {
            bail!("simulated credential failure");
        }
        Ok(Arc::new(self.clone()))
    }
}
