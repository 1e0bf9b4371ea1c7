//! Controller REST client
//!
//! Thin transport over the controller's `/flows` resource:
//!
//! - `POST   /flows/{deviceId}`          create a rule
//! - `GET    /flows`                     list every installed rule
//! - `DELETE /flows/{deviceId}/{flowId}` remove a rule by id
//!
//! Every request carries the configured basic-auth credentials. Nothing is
//! retried.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::device::DeviceId;
use crate::error::{Result, RuleError};
use crate::wire::{FlowList, InstalledRule, RulePayload};

/// Controller acknowledgement of a rule operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Rule accepted. `flow_id` is taken from the `Location` header when present.
    Installed { status: u16, flow_id: Option<String> },
    Removed { status: u16, flow_id: String },
    /// Nothing matched, so there was nothing to remove.
    NotPresent,
}

impl Ack {
    pub fn flow_id(&self) -> Option<&str> {
        match self {
            Ack::Installed { flow_id, .. } => flow_id.as_deref(),
            Ack::Removed { flow_id, .. } => Some(flow_id),
            Ack::NotPresent => None,
        }
    }
}

/// Operations the rule session needs from a controller
#[async_trait]
pub trait FlowApi: Send + Sync {
    /// Submit a rule for `device`; any non-success status is `RuleError::Install`.
    async fn create_flow(&self, device: &DeviceId, payload: &RulePayload) -> Result<Ack>;

    /// List every rule the controller holds, on all devices.
    async fn list_flows(&self) -> Result<Vec<InstalledRule>>;

    /// Remove a rule by id; any non-success status is `RuleError::Delete`.
    async fn remove_flow(&self, device: &DeviceId, flow_id: &str) -> Result<Ack>;
}

/// REST client for the controller flow API
pub struct OnosClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl OnosClient {
    /// Create a client with explicit request and connect timeouts
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(RuleError::ClientSetup)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> Result<Response> {
        req.basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|source| RuleError::Transport {
                url: url.to_string(),
                source,
            })
    }
}

/// Read the body of a failed response for error reporting.
async fn error_body(resp: Response) -> String {
    resp.text().await.unwrap_or_default()
}

/// Last path segment of a `Location` header, which is the new flow id.
fn flow_id_from_location(resp: &Response) -> Option<String> {
    let location = resp.headers().get(reqwest::header::LOCATION)?.to_str().ok()?;
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl FlowApi for OnosClient {
    async fn create_flow(&self, device: &DeviceId, payload: &RulePayload) -> Result<Ack> {
        let url = self.url(&format!("/flows/{}", device));
        debug!("POST {}", url);

        let resp = self.send(&url, self.client.post(&url).json(payload)).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RuleError::Install {
                status: status.as_u16(),
                body: error_body(resp).await,
                table: payload.table_id.clone(),
                device: device.to_string(),
            });
        }

        let flow_id = flow_id_from_location(&resp);
        info!("Install rule on {}: response {}", device, status);
        Ok(Ack::Installed {
            status: status.as_u16(),
            flow_id,
        })
    }

    async fn list_flows(&self) -> Result<Vec<InstalledRule>> {
        let url = self.url("/flows");
        debug!("GET {}", url);

        let resp = self.send(&url, self.client.get(&url)).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RuleError::Listing {
                status: status.as_u16(),
                body: error_body(resp).await,
            });
        }

        let list: FlowList = resp.json().await.map_err(|e| RuleError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(list.flows)
    }

    async fn remove_flow(&self, device: &DeviceId, flow_id: &str) -> Result<Ack> {
        let url = self.url(&format!("/flows/{}/{}", device, flow_id));
        debug!("DELETE {}", url);

        let resp = self.send(&url, self.client.delete(&url)).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RuleError::Delete {
                status: status.as_u16(),
                body: error_body(resp).await,
                flow_id: flow_id.to_string(),
                device: device.to_string(),
            });
        }

        info!("Delete rule {} on {}: response {}", flow_id, device, status);
        Ok(Ack::Removed {
            status: status.as_u16(),
            flow_id: flow_id.to_string(),
        })
    }
}
