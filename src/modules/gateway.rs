//! Typed client for the local marketplace gateway.
//!
//! Every call is synchronous request/response against a fixed endpoint
//! set. Transport failures and non-2xx statuses all surface as the same
//! retrieve-timeout error; retry policy lives with the callers.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::bootstrap::config::Config;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached or refused the request.
    #[error("retrieve timeout")]
    RetrieveTimeout,

    /// The gateway answered with a payload we cannot decode.
    #[error("unexpected gateway payload: {0}")]
    Decode(String),

    #[error("http client error: {0}")]
    Client(String),
}

/// Thumbnail content addresses carried by a listing summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thumbnail {
    #[serde(default)]
    pub tiny: String,
    #[serde(default)]
    pub small: String,
    #[serde(default)]
    pub medium: String,
}

/// One entry of a peer's listings-summary response. Marketplace-level
/// metadata we do not model explicitly rides along in `extra` so the
/// digest merge can carry it into the stored document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingSummary {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, rename = "peerSlug")]
    pub peer_slug: String,
    #[serde(default, rename = "parentPeer")]
    pub parent_peer: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub thumbnail: Thumbnail,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct GatewayClient {
    base: String,
    client: reqwest::Client,
    bulk_client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| GatewayError::Client(err.to_string()))?;
        let bulk_client = reqwest::Client::builder()
            .timeout(config.bulk_timeout)
            .build()
            .map_err(|err| GatewayError::Client(err.to_string()))?;
        Ok(Self {
            base: config.gateway_url.trim_end_matches('/').to_string(),
            client,
            bulk_client,
        })
    }

    /// Build a client against an explicit base URL with default timeouts.
    pub fn with_base(base: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Client(err.to_string()))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client: client.clone(),
            bulk_client: client,
        })
    }

    /// The gateway node's own peer-id, or `None` when the gateway reports
    /// failure (its error envelope carries a `success` field).
    pub async fn self_id(&self) -> Result<Option<String>, GatewayError> {
        let body: Map<String, Value> = self
            .get_json(&self.url("/ob/profile/"), &self.client)
            .await?;
        if body.contains_key("success") {
            return Ok(None);
        }
        Ok(body
            .get("peerID")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Peer-ids currently known to the gateway.
    pub async fn peers(&self) -> Result<Vec<String>, GatewayError> {
        self.get_json(&self.url("/ob/peers"), &self.client).await
    }

    /// Peer-ids closest to `peer` in the gateway's routing table.
    pub async fn closest_peers(&self, peer: &str) -> Result<Vec<String>, GatewayError> {
        self.get_json(&self.url(&format!("/ob/closestpeers/{peer}")), &self.client)
            .await
    }

    /// A peer's raw profile document, uncached.
    pub async fn profile(&self, peer: &str) -> Result<Value, GatewayError> {
        self.get_json(
            &self.url(&format!("/ob/profile/{peer}?usecache=false")),
            &self.client,
        )
        .await
    }

    /// A peer's listing summaries. This is the bulk endpoint and gets the
    /// longer timeout.
    pub async fn listings(&self, peer: &str) -> Result<Vec<ListingSummary>, GatewayError> {
        self.get_json(&self.url(&format!("/ob/listings/{peer}")), &self.bulk_client)
            .await
    }

    /// Full detail of one listing. The gateway wraps the listing under a
    /// `listing` key; unwrap it when present.
    pub async fn listing(&self, peer: &str, slug: &str) -> Result<Value, GatewayError> {
        let body: Value = self
            .get_json(&self.url(&format!("/ob/listing/{peer}/{slug}")), &self.client)
            .await?;
        Ok(match body.get("listing") {
            Some(inner) => inner.clone(),
            None => body,
        })
    }

    /// Whether the gateway can currently reach the peer.
    pub async fn is_peer_online(&self, peer: &str) -> bool {
        let url = self.url(&format!("/ob/peerinfo/{peer}?usecache=false"));
        match self.get_json::<HashMap<String, String>>(&url, &self.client).await {
            Ok(body) => body.get("result").map(String::as_str) == Some("online"),
            Err(_) => false,
        }
    }

    /// Raw media bytes from the gateway's IPFS endpoint.
    pub async fn media(&self, cid: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/ipfs/{cid}")))
            .send()
            .await
            .map_err(|_| GatewayError::RetrieveTimeout)?;
        if !response.status().is_success() {
            return Err(GatewayError::RetrieveTimeout);
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|_| GatewayError::RetrieveTimeout)
    }

    /// Proxy fetch of a cached-image URL, returning the raw response for
    /// header passthrough.
    pub async fn image(&self, cid: &str) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/ob/images/{cid}")))
            .send()
            .await
            .map_err(|_| GatewayError::RetrieveTimeout)?;
        if !response.status().is_success() {
            return Err(GatewayError::RetrieveTimeout);
        }
        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        client: &reqwest::Client,
    ) -> Result<T, GatewayError> {
        debug!(url, "Gateway request");
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|_| GatewayError::RetrieveTimeout)?;
        if !response.status().is_success() {
            return Err(GatewayError::RetrieveTimeout);
        }
        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}
