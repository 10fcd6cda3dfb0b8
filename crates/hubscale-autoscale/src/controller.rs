//! Collaborator interfaces consumed by the decision engine.
//!
//! Implementations live outside this crate (`hubscale-arm` talks to Azure
//! Resource Manager; `InMemoryHub` backs tests). Timeouts are the
//! implementation's business, but every call must eventually return.

use std::sync::Arc;

use async_trait::async_trait;

use hubscale_core::{ResourceDescriptor, UtilizationSample};

/// Management-plane operations on one kind of resource.
#[async_trait]
pub trait ResourceController: Send + Sync {
    /// Current configuration of the resource.
    async fn get(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> anyhow::Result<ResourceDescriptor>;

    /// All utilization samples the resource reports.
    async fn get_utilization_metrics(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> anyhow::Result<Vec<UtilizationSample>>;

    /// Submit a new configuration. The only mutating call.
    async fn create_or_update(
        &self,
        resource_group: &str,
        resource_name: &str,
        descriptor: &ResourceDescriptor,
    ) -> anyhow::Result<()>;
}

/// Produces an authenticated controller, once per cycle.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Arc<dyn ResourceController>>;
}
