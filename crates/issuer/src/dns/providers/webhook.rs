//! Generic webhook DNS provider
//!
//! Allows integration with custom DNS management systems via HTTP webhooks.
//!
//! # Webhook API
//!
//! ## Create Record
//! ```text
//! POST {url}/records
//! Content-Type: application/json
//!
//! {
//!   "name": "_acme-challenge.example.com",
//!   "type": "TXT",
//!   "value": "challenge-value",
//!   "ttl": 60,
//!   "account_id": "1234"
//! }
//!
//! Response:
//! {
//!   "change_id": "unique-id"
//! }
//! ```
//!
//! ## Change Status
//! ```text
//! GET {url}/changes/{change_id}?account_id={account_id}
//!
//! Response:
//! {
//!   "status": "pending" | "insync" | "failed",
//!   "message": "optional detail"
//! }
//! ```
//!
//! ## Delete Record
//! ```text
//! DELETE {url}/records/{change_id}?name={name}&value={value}&account_id={account_id}
//!
//! Response: 200 OK or 204 No Content
//! ```
//!
//! ## List Zones
//! ```text
//! GET {url}/zones?account_id={account_id}
//!
//! Response:
//! {
//!   "zones": ["example.com", "example.org"]
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use zonecert_config::WebhookPluginConfig;

use crate::dns::provider::{DnsProvider, DnsProviderError, DnsResult, CHALLENGE_TTL};

/// Webhook DNS provider for custom integrations
#[derive(Debug)]
pub struct WebhookProvider {
    name: String,
    client: Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
    check_interval: Duration,
    propagation_timeout: Duration,
}

impl WebhookProvider {
    /// Create a webhook provider from a plugin definition
    pub fn from_config(name: &str, config: &WebhookPluginConfig) -> DnsResult<Self> {
        Self::new(
            name.to_string(),
            config.url.clone(),
            config.token(),
            config.timeout(),
        )
        .map(|provider| {
            provider.with_propagation(config.check_interval(), config.propagation_timeout())
        })
    }

    /// Create a new webhook DNS provider
    ///
    /// # Arguments
    ///
    /// * `name` - Plugin name used in logs
    /// * `base_url` - Base URL for the webhook API
    /// * `token` - Optional bearer token
    /// * `timeout` - Request timeout
    pub fn new(
        name: String,
        base_url: String,
        token: Option<String>,
        timeout: Duration,
    ) -> DnsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        // Remove trailing slash from base URL
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            name,
            client,
            base_url,
            token,
            request_timeout: timeout,
            check_interval: Duration::from_secs(5),
            propagation_timeout: Duration::from_secs(120),
        })
    }

    /// Set the change status polling interval and overall propagation timeout
    pub fn with_propagation(mut self, check_interval: Duration, timeout: Duration) -> Self {
        self.check_interval = check_interval;
        self.propagation_timeout = timeout;
        self
    }

    /// Endpoint URL under the base URL; each segment is percent-encoded
    fn endpoint(&self, segments: &[&str]) -> DnsResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            DnsProviderError::Configuration(format!("Invalid webhook URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                DnsProviderError::Configuration(format!(
                    "Webhook URL cannot be a base: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Add authentication to a request
    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> DnsResult<reqwest::Response> {
        let response = self.add_auth(request).send().await.map_err(|e| {
            if e.is_timeout() {
                DnsProviderError::Timeout {
                    elapsed_secs: self.request_timeout.as_secs(),
                }
            } else {
                DnsProviderError::ApiRequest(format!("Webhook request failed: {}", e))
            }
        })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DnsProviderError::Authentication(
                "Webhook authentication failed".to_string(),
            ));
        }

        Ok(response)
    }

    async fn change_status(
        &self,
        change_id: &str,
        account_id: Option<&str>,
    ) -> DnsResult<ChangeStatusResponse> {
        let mut request = self.client.get(self.endpoint(&["changes", change_id])?);
        if let Some(account_id) = account_id {
            request = request.query(&[("account_id", account_id)]);
        }

        let response = self.send(request).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::ApiRequest(format!(
                "Webhook returned HTTP {} - {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to parse webhook response: {}", e))
        })
    }
}

#[async_trait]
impl DnsProvider for WebhookProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_txt_record(
        &self,
        name: &str,
        value: &str,
        account_id: Option<&str>,
    ) -> DnsResult<String> {
        debug!(
            plugin = %self.name,
            record_name = %name,
            url = %self.base_url,
            "Creating TXT record via webhook"
        );

        let request = CreateRecordRequest {
            name,
            record_type: "TXT",
            value,
            ttl: CHALLENGE_TTL,
            account_id,
        };

        let response = self
            .send(
                self.client
                    .post(self.endpoint(&["records"])?)
                    .json(&request),
            )
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordCreation {
                record_name: name.to_string(),
                message: format!("Webhook returned HTTP {} - {}", status, body),
            });
        }

        let record_response: CreateRecordResponse = response.json().await.map_err(|e| {
            DnsProviderError::RecordCreation {
                record_name: name.to_string(),
                message: format!("Failed to parse webhook response: {}", e),
            }
        })?;

        debug!(change_id = %record_response.change_id, "TXT record created via webhook");
        Ok(record_response.change_id)
    }

    async fn wait_for_dns_change(
        &self,
        change_id: &str,
        account_id: Option<&str>,
    ) -> DnsResult<()> {
        let start = Instant::now();
        let deadline = start + self.propagation_timeout;

        debug!(
            change_id = %change_id,
            timeout_secs = self.propagation_timeout.as_secs(),
            "Waiting for DNS change to propagate"
        );

        loop {
            let status = self.change_status(change_id, account_id).await?;
            match status.status {
                ChangeState::Insync => {
                    debug!(
                        change_id = %change_id,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "DNS change propagated"
                    );
                    return Ok(());
                }
                ChangeState::Failed => {
                    return Err(DnsProviderError::Propagation {
                        change_id: change_id.to_string(),
                        message: status
                            .message
                            .unwrap_or_else(|| "provider reported failure".to_string()),
                    });
                }
                ChangeState::Pending => {
                    trace!(change_id = %change_id, "DNS change still pending");
                }
            }

            if Instant::now() + self.check_interval > deadline {
                return Err(DnsProviderError::PropagationTimeout {
                    change_id: change_id.to_string(),
                    elapsed_secs: start.elapsed().as_secs(),
                });
            }

            tokio::time::sleep(self.check_interval).await;
        }
    }

    async fn delete_txt_record(
        &self,
        change_id: &str,
        account_id: Option<&str>,
        name: &str,
        value: &str,
    ) -> DnsResult<()> {
        debug!(
            change_id = %change_id,
            record_name = %name,
            "Deleting TXT record via webhook"
        );

        let mut query = vec![("name", name), ("value", value)];
        if let Some(account_id) = account_id {
            query.push(("account_id", account_id));
        }

        let response = self
            .send(
                self.client
                    .delete(self.endpoint(&["records", change_id])?)
                    .query(&query),
            )
            .await?;

        // 404 is acceptable - record might already be deleted
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(change_id = %change_id, "Record already deleted");
            return Ok(());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordDeletion {
                change_id: change_id.to_string(),
                message: format!("Webhook returned HTTP {} - {}", status, body),
            });
        }

        debug!(change_id = %change_id, "TXT record deleted via webhook");
        Ok(())
    }

    async fn get_zones(&self, account_id: Option<&str>) -> DnsResult<Vec<String>> {
        let mut request = self.client.get(self.endpoint(&["zones"])?);
        if let Some(account_id) = account_id {
            request = request.query(&[("account_id", account_id)]);
        }

        let response = self.send(request).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::ApiRequest(format!(
                "Webhook returned HTTP {} - {}",
                status, body
            )));
        }

        let zones: ZonesResponse = response.json().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to parse webhook response: {}", e))
        })?;

        Ok(zones.zones)
    }
}

// Webhook API types

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    record_type: &'a str,
    value: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    change_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ChangeState {
    Pending,
    Insync,
    Failed,
}

#[derive(Debug, Deserialize)]
struct ChangeStatusResponse {
    status: ChangeState,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    zones: Vec<String>,
}
