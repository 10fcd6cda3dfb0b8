//! `Microsoft.Devices/IotHubs` management client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use hubscale_autoscale::ResourceController;
use hubscale_core::{ResourceDescriptor, UtilizationSample};

use crate::error::{ArmError, ArmResult};

/// IoT hub resource provider API version.
pub const API_VERSION: &str = "2023-06-30";

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Scaling a hub usually completes within minutes.
const OPERATION_DEADLINE: Duration = Duration::from_secs(30 * 60);
/// Upper bound on quota metric pages followed.
const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaMetricInfo {
    name: Option<String>,
    current_value: Option<i64>,
    max_value: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaMetricPage {
    #[serde(default)]
    value: Vec<QuotaMetricInfo>,
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<Value>,
}

/// Authenticated client for one subscription.
pub struct ArmIotHubClient {
    http: reqwest::Client,
    management: String,
    subscription_id: String,
    token: String,
    poll_interval: Duration,
}

impl ArmIotHubClient {
    pub fn new(http: reqwest::Client, management: &str, subscription_id: &str, token: String) -> Self {
        Self {
            http,
            management: management.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            token,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the fallback interval used when polling long-running
    /// operations without a `Retry-After` header.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn hub_url(&self, resource_group: &str, hub_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Devices/IotHubs/{}",
            self.management, self.subscription_id, resource_group, hub_name
        )
    }

    async fn get_json(&self, operation: &'static str, url: &str) -> ArmResult<Value> {
        debug!(%url, operation, "arm request");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("api-version", API_VERSION)])
            .send()
            .await?;
        check_status(operation, response).await?.json().await.map_err(ArmError::from)
    }

    /// Follow a `nextLink`, which already carries its own query string.
    async fn get_link(&self, url: &str) -> ArmResult<QuotaMetricPage> {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        Ok(check_status("quota metrics page", response).await?.json().await?)
    }

    pub async fn get_hub(&self, resource_group: &str, hub_name: &str) -> ArmResult<ResourceDescriptor> {
        let document = self
            .get_json("get hub", &self.hub_url(resource_group, hub_name))
            .await?;
        descriptor_from_document(hub_name, document)
    }

    pub async fn quota_metrics(
        &self,
        resource_group: &str,
        hub_name: &str,
    ) -> ArmResult<Vec<UtilizationSample>> {
        let url = format!("{}/quotaMetrics", self.hub_url(resource_group, hub_name));
        let first = self.get_json("quota metrics", &url).await?;
        let mut page: QuotaMetricPage =
            serde_json::from_value(first).map_err(|e| ArmError::Malformed(e.to_string()))?;

        let mut samples = Vec::new();
        let mut pages = 1;
        loop {
            samples.extend(page.value.into_iter().filter_map(sample_from_info));
            match page.next_link {
                Some(link) if !link.is_empty() && pages < MAX_PAGES => {
                    page = self.get_link(&link).await?;
                    pages += 1;
                }
                Some(link) if !link.is_empty() => {
                    warn!(pages, "quota metrics paging limit reached");
                    break;
                }
                _ => break,
            }
        }
        Ok(samples)
    }

    /// PUT the hub document and wait for the operation to finish.
    pub async fn put_hub(
        &self,
        resource_group: &str,
        hub_name: &str,
        descriptor: &ResourceDescriptor,
    ) -> ArmResult<()> {
        let body = document_for_update(descriptor);
        let url = self.hub_url(resource_group, hub_name);
        debug!(%url, tier = %descriptor.tier_name, capacity = ?descriptor.tier_capacity, "arm update");

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .query(&[("api-version", API_VERSION)])
            .json(&body)
            .send()
            .await?;
        let response = check_status("update hub", response).await?;

        let operation_url = response
            .headers()
            .get(AZURE_ASYNC_OPERATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match operation_url {
            Some(op) => {
                let wait = retry_after(response.headers()).unwrap_or(self.poll_interval);
                self.wait_for_operation(&op, wait).await
            }
            None => Ok(()),
        }
    }

    async fn wait_for_operation(&self, url: &str, mut wait: Duration) -> ArmResult<()> {
        let deadline = Instant::now() + OPERATION_DEADLINE;
        loop {
            tokio::time::sleep(wait).await;
            let response = self.http.get(url).bearer_auth(&self.token).send().await?;
            let response = check_status("operation status", response).await?;
            wait = retry_after(response.headers())
                .unwrap_or(self.poll_interval)
                .min(MAX_POLL_INTERVAL);
            let status: OperationStatus = response.json().await?;
            debug!(status = %status.status, "arm operation status");
            match status.status.as_str() {
                "Succeeded" => return Ok(()),
                "Failed" | "Canceled" => {
                    let detail = status
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no error detail".to_string());
                    return Err(ArmError::OperationFailed(format!("{}: {detail}", status.status)));
                }
                _ if Instant::now() >= deadline => {
                    return Err(ArmError::OperationFailed(format!(
                        "still {} after {}s",
                        status.status,
                        OPERATION_DEADLINE.as_secs()
                    )));
                }
                _ => {}
            }
        }
    }
}

async fn check_status(operation: &'static str, response: reqwest::Response) -> ArmResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!(%status, operation, "arm request failed");
    Err(ArmError::Status {
        operation,
        status,
        body,
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn sample_from_info(info: QuotaMetricInfo) -> Option<UtilizationSample> {
    Some(UtilizationSample {
        metric_name: info.name?,
        current_value: info.current_value,
        max_value: info.max_value.and_then(|v| u64::try_from(v).ok()),
    })
}

/// Build a descriptor from a hub document, keeping the document itself.
fn descriptor_from_document(hub_name: &str, document: Value) -> ArmResult<ResourceDescriptor> {
    let sku = document
        .get("sku")
        .ok_or_else(|| ArmError::Malformed(format!("hub {hub_name} has no sku")))?;
    let tier_name = sku
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ArmError::Malformed(format!("hub {hub_name} has no sku.name")))?
        .to_string();
    let tier_capacity = sku.get("capacity").and_then(Value::as_u64);
    let name = document
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(hub_name)
        .to_string();
    Ok(ResourceDescriptor {
        name,
        tier_name,
        tier_capacity,
        document,
    })
}

/// The hub document with `sku.name` and `sku.capacity` taken from the
/// descriptor; everything else as fetched.
fn document_for_update(descriptor: &ResourceDescriptor) -> Value {
    let mut document = match &descriptor.document {
        Value::Object(_) => descriptor.document.clone(),
        _ => serde_json::json!({}),
    };
    if let Value::Object(map) = &mut document {
        let sku = map
            .entry("sku")
            .or_insert_with(|| serde_json::json!({}));
        if !sku.is_object() {
            *sku = serde_json::json!({});
        }
        if let Value::Object(sku) = sku {
            sku.insert("name".to_string(), Value::from(descriptor.tier_name.clone()));
            if let Some(capacity) = descriptor.tier_capacity {
                sku.insert("capacity".to_string(), Value::from(capacity));
            }
        }
    }
    document
}

#[async_trait]
impl ResourceController for ArmIotHubClient {
    async fn get(&self, resource_group: &str, resource_name: &str) -> anyhow::Result<ResourceDescriptor> {
        Ok(self.get_hub(resource_group, resource_name).await?)
    }

    async fn get_utilization_metrics(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> anyhow::Result<Vec<UtilizationSample>> {
        Ok(self.quota_metrics(resource_group, resource_name).await?)
    }

    async fn create_or_update(
        &self,
        resource_group: &str,
        resource_name: &str,
        descriptor: &ResourceDescriptor,
    ) -> anyhow::Result<()> {
        Ok(self.put_hub(resource_group, resource_name, descriptor).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HUB_PATH: &str =
        "/subscriptions/sub-1/resourceGroups/rg-iot/providers/Microsoft.Devices/IotHubs/hub-1";

    fn client(server: &MockServer) -> ArmIotHubClient {
        ArmIotHubClient::new(reqwest::Client::new(), &server.uri(), "sub-1", "tok".to_string())
            .with_poll_interval(Duration::from_millis(10))
    }

    fn hub_document(capacity: u64) -> Value {
        json!({
            "id": HUB_PATH,
            "name": "hub-1",
            "location": "westeurope",
            "etag": "AAAA",
            "sku": {"name": "S1", "tier": "Standard", "capacity": capacity},
            "properties": {"eventHubEndpoints": {"events": {"partitionCount": 4}}}
        })
    }

    #[tokio::test]
    async fn get_hub_parses_sku() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(HUB_PATH))
            .and(query_param("api-version", API_VERSION))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hub_document(3)))
            .mount(&server)
            .await;

        let d = client(&server).get_hub("rg-iot", "hub-1").await.unwrap();
        assert_eq!(d.name, "hub-1");
        assert_eq!(d.tier_name, "S1");
        assert_eq!(d.tier_capacity, Some(3));
        assert_eq!(d.document["location"], "westeurope");
    }

    #[tokio::test]
    async fn get_hub_not_found_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(HUB_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_string("ResourceNotFound"))
            .mount(&server)
            .await;

        let err = client(&server).get_hub("rg-iot", "hub-1").await.unwrap_err();
        assert!(matches!(err, ArmError::Status { status, .. } if status.as_u16() == 404));
    }

    #[test]
    fn document_without_sku_is_malformed() {
        let err = descriptor_from_document("hub-1", json!({"name": "hub-1"})).unwrap_err();
        assert!(matches!(err, ArmError::Malformed(_)));
    }

    #[tokio::test]
    async fn quota_metrics_follow_next_link() {
        let server = MockServer::start().await;
        let next = format!("{}/page2?api-version={API_VERSION}&skipToken=abc", server.uri());
        Mock::given(method("GET"))
            .and(path(format!("{HUB_PATH}/quotaMetrics")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "TotalMessages", "currentValue": 1234, "maxValue": 400000}],
                "nextLink": next
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .and(query_param("skipToken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "TotalDeviceCount", "currentValue": 7, "maxValue": 1000000}],
                "nextLink": null
            })))
            .mount(&server)
            .await;

        let samples = client(&server).quota_metrics("rg-iot", "hub-1").await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].metric_name, "TotalMessages");
        assert_eq!(samples[0].current_value, Some(1234));
        assert_eq!(samples[0].max_value, Some(400_000));
        assert_eq!(samples[1].metric_name, "TotalDeviceCount");
    }

    #[tokio::test]
    async fn put_hub_sends_new_capacity_and_waits_for_operation() {
        let server = MockServer::start().await;
        let op_url = format!("{}/operations/op-1", server.uri());
        Mock::given(method("PUT"))
            .and(path(HUB_PATH))
            .and(query_param("api-version", API_VERSION))
            .and(body_partial_json(json!({
                "location": "westeurope",
                "etag": "AAAA",
                "sku": {"name": "S1", "capacity": 4}
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Azure-AsyncOperation", op_url.as_str())
                    .set_body_json(hub_document(4)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let d = descriptor_from_document("hub-1", hub_document(3)).unwrap();
        c.put_hub("rg-iot", "hub-1", &d.with_capacity(4)).await.unwrap();
    }

    #[tokio::test]
    async fn failed_operation_is_reported() {
        let server = MockServer::start().await;
        let op_url = format!("{}/operations/op-2", server.uri());
        Mock::given(method("PUT"))
            .and(path(HUB_PATH))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Azure-AsyncOperation", op_url.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": {"code": "QuotaExceeded"}
            })))
            .mount(&server)
            .await;

        let c = client(&server);
        let d = descriptor_from_document("hub-1", hub_document(3)).unwrap();
        let err = c.put_hub("rg-iot", "hub-1", &d.with_capacity(4)).await.unwrap_err();
        assert!(matches!(err, ArmError::OperationFailed(ref m) if m.contains("QuotaExceeded")));
    }

    #[test]
    fn update_document_replaces_only_sku_fields() {
        let d = descriptor_from_document("hub-1", hub_document(3)).unwrap().with_capacity(9);
        let body = document_for_update(&d);
        assert_eq!(body["sku"]["capacity"], 9);
        assert_eq!(body["sku"]["name"], "S1");
        assert_eq!(body["sku"]["tier"], "Standard");
        assert_eq!(body["properties"]["eventHubEndpoints"]["events"]["partitionCount"], 4);
    }

    #[test]
    fn update_document_from_empty_descriptor() {
        let d = ResourceDescriptor {
            name: "hub".to_string(),
            tier_name: "S2".to_string(),
            tier_capacity: Some(2),
            document: Value::Null,
        };
        assert_eq!(document_for_update(&d), json!({"sku": {"name": "S2", "capacity": 2}}));
    }

    #[test]
    fn metric_values_are_passed_through_unclamped() {
        let missing = sample_from_info(QuotaMetricInfo {
            name: Some("TotalMessages".to_string()),
            current_value: None,
            max_value: Some(-1),
        })
        .unwrap();
        assert_eq!(missing.current_value, None);
        assert_eq!(missing.max_value, None);

        let negative = sample_from_info(QuotaMetricInfo {
            name: Some("TotalMessages".to_string()),
            current_value: Some(-1),
            max_value: None,
        })
        .unwrap();
        assert_eq!(negative.current_value, Some(-1));

        assert!(
            sample_from_info(QuotaMetricInfo {
                name: None,
                current_value: Some(1),
                max_value: None
            })
            .is_none()
        );
    }
}
